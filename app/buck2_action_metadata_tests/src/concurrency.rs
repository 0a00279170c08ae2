/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is dual-licensed under either the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree or the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree. You may select, at your option, one of the
 * above-listed licenses.
 */

use std::sync::Arc;
use std::sync::Barrier;

use buck2_action_metadata::artifact::Artifact;
use buck2_action_metadata::discovery::DiscoverySource;
use buck2_action_metadata::graph::ActionGraph;
use buck2_action_metadata::identity::ActionIdentity;
use buck2_action_metadata::impls::run::RunActionBuilder;
use buck2_action_metadata::key::DefaultActionKeyContext;
use buck2_action_metadata::knobs::ActionGraphKnobs;

const READERS: usize = 8;

#[test]
fn test_completion_is_visible_to_all_threads() -> anyhow::Result<()> {
    let graph = ActionGraph::new(ActionGraphKnobs::default());
    let b = graph.register(
        RunActionBuilder::new(ActionIdentity::testing_new("//app:main", 0), "CppCompile")
            .args(["cc", "-c", "app/main.cc"])
            .input(Artifact::source("app/main.cc")?)
            .output(Artifact::build("out/app/main.o")?)
            .discovers_inputs(true)
            .build()?,
    )?;
    let ctx = DefaultActionKeyContext::new();
    let key = b.key(&ctx);
    let completed = Barrier::new(READERS + 1);

    std::thread::scope(|s| {
        for _ in 0..READERS {
            s.spawn(|| {
                // Before completion readers may see either state, but a
                // discovered set is never observed half-written.
                if let Some(d) = b.discovered_inputs() {
                    assert_eq!(d.inputs().len(), 2);
                }
                assert_eq!(b.key(&ctx), key);
                completed.wait();
                assert!(b.inputs_discovered());
                assert_eq!(b.discovered_inputs().unwrap().inputs().len(), 2);
            });
        }

        b.begin_execution()
            .and_then(|attempt| {
                attempt.complete_discovery(
                    DiscoverySource::Executed,
                    [
                        Artifact::testing_source("app/h1.h"),
                        Artifact::testing_source("app/h2.h"),
                    ],
                )
            })
            .unwrap();
        completed.wait();
    });
    Ok(())
}

#[test]
fn test_only_one_thread_claims_an_attempt() -> anyhow::Result<()> {
    let b = Arc::new(
        RunActionBuilder::new(ActionIdentity::testing_new("//app:main", 0), "CppCompile")
            .arg("cc")
            .output(Artifact::build("out/app/main.o")?)
            .discovers_inputs(true)
            .build()?,
    );
    let start = Barrier::new(READERS);
    let claimed = Barrier::new(READERS);

    let winners = std::thread::scope(|s| {
        let handles: Vec<_> = (0..READERS)
            .map(|_| {
                s.spawn(|| {
                    start.wait();
                    let attempt = b.begin_execution().ok();
                    // Hold the claim until every thread has tried.
                    claimed.wait();
                    attempt.is_some()
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count()
    });
    assert_eq!(winners, 1);
    Ok(())
}

#[test]
fn test_concurrent_registration() -> anyhow::Result<()> {
    let graph = ActionGraph::new(ActionGraphKnobs::default());
    std::thread::scope(|s| {
        for i in 0..READERS {
            let graph = &graph;
            s.spawn(move || {
                let action = RunActionBuilder::new(
                    ActionIdentity::testing_new("//pkg:many", i as u32),
                    "Gen",
                )
                .arg("gen")
                .output(Artifact::testing_build(&format!("out/pkg/{i}")))
                .build()
                .unwrap();
                graph.register(action).unwrap();
            });
        }
    });
    assert_eq!(graph.len(), READERS);
    for i in 0..READERS {
        let out = Artifact::testing_build(&format!("out/pkg/{i}"));
        assert_eq!(graph.producer_of(&out).unwrap().primary_output(), &out);
    }
    Ok(())
}
