/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is dual-licensed under either the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree or the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree. You may select, at your option, one of the
 * above-listed licenses.
 */

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;

/// Environment variable holding the log filter, in `EnvFilter` syntax.
pub const LOG_ENV_VAR: &str = "ACTION_METADATA_LOG";

pub fn init_tracing_for_writer<W>(writer: W) -> anyhow::Result<()>
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    // By default, show warnings/errors.
    let filter = match std::env::var(LOG_ENV_VAR) {
        Ok(v) => EnvFilter::try_new(&v).map_err(|e| {
            anyhow::anyhow!("Failed to parse ${} as a filter: {}", LOG_ENV_VAR, e)
        })?,
        Err(_) => EnvFilter::new("warn"),
    };

    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_filter(filter);

    tracing_subscriber::registry().with(layer).try_init()?;

    Ok(())
}

/// Sends logs to the test harness so they only show up for failing tests.
/// Safe to call from every test: only the first call installs a subscriber.
pub fn init_tracing_for_tests() {
    let _ignored = init_tracing_for_writer(tracing_subscriber::fmt::TestWriter::new());
}
