mod common;

use common::strategies::*;
use imagine_bridge::correlation::hashing::{
    canonical_prompt, hash_from_failure_footer, hash_from_message_content, submission_hash,
};
use imagine_bridge::config::{BridgeConfig, WorkerConfig};
use imagine_bridge::correlation::{CorrelationIndex, CorrelationKey};
use imagine_bridge::events::Classification;
use imagine_bridge::lifecycle::{GenerateSubmission, LifecycleCoordinator};
use imagine_bridge::task::{TaskId, TaskKind, TaskRuntime};
use proptest::prelude::*;
use tokio::sync::mpsc;
use tokio::sync::oneshot::error::TryRecvError;
use tokio::time::{Duration, Instant};

fn origin_content(echoed_prompt: &str) -> String {
    format!("**{echoed_prompt}** - <@1014853171543822356> (relaxed)")
}

proptest! {
    /// Property: the prompt echoed on the origin message hashes to the submission hash
    #[test]
    fn origin_echo_matches_submission(prompt in prompt_strategy(), seed in seed_strategy()) {
        let canonical = canonical_prompt(&prompt, "", seed);
        let submitted = submission_hash(&canonical, seed);
        let echoed = hash_from_message_content(&origin_content(&canonical));
        prop_assert_eq!(echoed, Some(submitted));
    }

    /// Property: links are rewritten upstream, so the hash never depends on link text
    #[test]
    fn link_rewrites_do_not_change_the_hash(
        prompt in prompt_strategy(),
        submitted_link in link_strategy(),
        echoed_link in link_strategy(),
        seed in seed_strategy(),
    ) {
        let canonical = canonical_prompt(&format!("{submitted_link} {prompt}"), "", seed);
        let echoed_prompt = format!("<{echoed_link}> {prompt} --seed {seed}");

        prop_assert_eq!(
            hash_from_message_content(&origin_content(&echoed_prompt)),
            Some(submission_hash(&canonical, seed))
        );
    }

    /// Property: a failure footer echoing the command resolves to the same task
    #[test]
    fn failure_footer_matches_submission(
        prompt in prompt_strategy(),
        link in link_strategy(),
        seed in seed_strategy(),
    ) {
        let canonical = canonical_prompt(&format!("{link} {prompt}"), "--ar 3:2", seed);
        prop_assert_eq!(
            hash_from_failure_footer(&format!("/imagine {canonical}")),
            Some(submission_hash(&canonical, seed))
        );
    }

    /// Property: caller spacing never changes the canonical prompt
    #[test]
    fn canonical_prompt_ignores_spacing((clean, padded) in padded_prompt_strategy(), seed in seed_strategy()) {
        prop_assert_eq!(canonical_prompt(&padded, "", seed), canonical_prompt(&clean, "", seed));
    }

    /// Property: the seed separates otherwise identical prompts
    #[test]
    fn distinct_seeds_give_distinct_hashes(prompt in prompt_strategy(), a in seed_strategy(), b in seed_strategy()) {
        prop_assume!(a != b);
        prop_assert_ne!(
            submission_hash(&canonical_prompt(&prompt, "", a), a),
            submission_hash(&canonical_prompt(&prompt, "", b), b)
        );
    }

    /// Property: colliding submissions resolve oldest first, each exactly once
    #[test]
    fn colliding_keywords_resolve_in_fifo_order(prompt in prompt_strategy(), seed in seed_strategy(), count in 1usize..6) {
        let canonical = canonical_prompt(&prompt, "", seed);
        let hash = submission_hash(&canonical, seed);
        let key = CorrelationKey::ByKeywordHash(hash.clone());

        let mut index = CorrelationIndex::new();
        let mut receivers = Vec::new();
        let ids: Vec<TaskId> = (0..count).map(|n| TaskId::from(format!("task-{n}"))).collect();
        for task_id in &ids {
            let (mut runtime, receiver) = TaskRuntime::new(task_id.clone(), TaskKind::Generate, false, 4);
            runtime.keyword_hash = Some(hash.clone());
            prop_assert!(index.insert(runtime));
            receivers.push(receiver);
        }
        // a second insert of a live id is refused
        let (duplicate, _) = TaskRuntime::new(ids[0].clone(), TaskKind::Generate, false, 4);
        prop_assert!(!index.insert(duplicate));

        for (n, expected) in ids.iter().enumerate() {
            // repeated lookups are stable until the match is consumed
            prop_assert_eq!(index.lookup(&key), Some(expected));
            prop_assert_eq!(index.lookup(&key), Some(expected));
            let message_id = format!("m-{n}");
            prop_assert!(index.bind_origin(expected, &message_id));
            prop_assert_eq!(
                index.lookup(&CorrelationKey::ByOriginMessageId(message_id)),
                Some(expected)
            );
        }
        prop_assert_eq!(index.lookup(&key), None);
        prop_assert_eq!(index.len(), count);

        for task_id in &ids {
            prop_assert!(index.remove(task_id).is_some());
            prop_assert!(index.remove(task_id).is_none());
        }
        prop_assert!(index.is_empty());
    }

    /// Property: whatever events and caller actions follow, a task is resolved
    /// at most once and by the first action that reaches it
    #[test]
    fn tasks_resolve_at_most_once(
        prompt in prompt_strategy(),
        seed in seed_strategy(),
        actions in lifecycle_actions_strategy(),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async move {
            let config = BridgeConfig::default();
            let (commands, _queued) = mpsc::channel(16);
            let coordinator = LifecycleCoordinator::new(&WorkerConfig::default(), &config, commands);

            let canonical = canonical_prompt(&prompt, "", seed);
            let hash = submission_hash(&canonical, seed);
            let task_id = TaskId::from("task-0");
            let mut receiver = coordinator
                .admit_generate(GenerateSubmission {
                    task_id: task_id.clone(),
                    canonical_prompt: canonical,
                    seed,
                    fast_mode: false,
                    auto_upscale: false,
                    expected_count: 0,
                })
                .await
                .unwrap();

            // Some(true) success, Some(false) failure, None reaped without a result
            let mut outcome: Option<Option<bool>> = None;
            for action in &actions {
                let live = coordinator.task_state(&task_id).is_some();
                match *action {
                    LifecycleAction::Deliver(n) => {
                        coordinator.apply(Classification::OriginArtifact {
                            key: CorrelationKey::ByKeywordHash(hash.clone()),
                            message_id: format!("m-{n}"),
                            url: "https://cdn.example.com/grid.png".to_string(),
                            artifact_id: None,
                        });
                        if live && outcome.is_none() {
                            outcome = Some(Some(true));
                        }
                    }
                    LifecycleAction::Fail(n) => {
                        coordinator.apply(Classification::Failure {
                            keys: vec![CorrelationKey::ByKeywordHash(hash.clone())],
                            message_id: format!("f-{n}"),
                            title: "Queue full".to_string(),
                            description: String::new(),
                            known: true,
                        });
                        if live && outcome.is_none() {
                            outcome = Some(Some(false));
                        }
                    }
                    LifecycleAction::Reap => {
                        prop_assert_eq!(coordinator.reap(&task_id), live);
                        if live && outcome.is_none() {
                            outcome = Some(None);
                        }
                    }
                    LifecycleAction::Expire => {
                        let later = Instant::now() + config.timeouts.task_ttl() + Duration::from_secs(1);
                        let report = coordinator.reap_expired(later);
                        prop_assert_eq!(report.expired_tasks.len(), usize::from(live));
                        if live && outcome.is_none() {
                            outcome = Some(Some(false));
                        }
                    }
                }
                prop_assert_eq!(coordinator.live_count(), 0);
            }

            match outcome {
                Some(Some(successful)) => {
                    let result = receiver.try_recv().unwrap();
                    prop_assert_eq!(result.successful, successful);
                    prop_assert_eq!(result.task_id, task_id);
                }
                _ => prop_assert!(matches!(receiver.try_recv(), Err(TryRecvError::Closed))),
            }
            prop_assert!(matches!(receiver.try_recv(), Err(TryRecvError::Closed)));
            Ok::<(), TestCaseError>(())
        })?;
    }
}
