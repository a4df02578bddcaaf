//! End-to-end submission flow over the in-memory stores.

mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;

use common::{candidate, harness, request, with_file, StubCaptcha};
use sumi_core::build::{BuildTarget, DeferStrategy, SaneStrategy};
use sumi_core::capacity::HardLimits;
use sumi_core::error::CoreError;
use sumi_core::filters::{default_rules, FilterAction, FilterCondition, FilterRule, TextField};
use sumi_core::fingerprint::DedupScope;
use sumi_core::models::ThreadFlags;
use sumi_core::ports::{BanStore, PageStore, PostStore};
use sumi_pipeline::config::BoardConfig;
use sumi_pipeline::submit::SubmitRequest;

fn sane_defer() -> Vec<Box<dyn sumi_core::build::BuildStrategy>> {
    vec![Box::new(SaneStrategy), Box::new(DeferStrategy)]
}

#[tokio::test]
async fn accepted_op_commits_and_schedules_builds() {
    let h = harness(sane_defer());
    let cfg = BoardConfig::default();

    let result = h
        .pipeline
        .submit(&cfg, request(candidate("b", None, "1.2.3.4", "first post")))
        .await
        .unwrap();

    assert_eq!(result.post_id, 1);
    assert_eq!(result.thread_id, 1);
    let redirect = BuildTarget::Thread { board: "b".to_string(), thread: 1 };
    assert_eq!(result.redirect, redirect);

    // Redirect target rendered inline, the rest deferred.
    assert!(h.pages.read(&redirect).await.unwrap().is_some());
    let queued: Vec<_> = h.queue.tasks().into_iter().map(|t| t.target).collect();
    assert!(queued.contains(&BuildTarget::IndexPage { board: "b".to_string(), page: 1 }));
    assert!(queued.contains(&BuildTarget::Catalog { board: "b".to_string() }));
}

#[tokio::test]
async fn reply_to_missing_thread_is_not_found() {
    let h = harness(sane_defer());
    let cfg = BoardConfig::default();

    let err = h
        .pipeline
        .submit(&cfg, request(candidate("b", Some(99), "1.2.3.4", "hello?")))
        .await
        .unwrap_err();
    assert_matches!(err, CoreError::NotFound { entity: "thread", id: 99 });
}

#[tokio::test]
async fn flood_rule_rejects_rapid_repost_from_same_ip() {
    let h = harness(sane_defer());
    let cfg = BoardConfig {
        filters: default_rules(60, 600, 120, "Flood detected; wait before posting again."),
        ..BoardConfig::default()
    };

    h.pipeline
        .submit(&cfg, request(candidate("b", None, "1.2.3.4", "one")))
        .await
        .unwrap();
    assert!(h.flood.len() > 0);

    let err = h
        .pipeline
        .submit(&cfg, request(candidate("b", None, "1.2.3.4", "two")))
        .await
        .unwrap_err();
    assert_matches!(err, CoreError::RateLimited(_));

    // A different submitter is unaffected.
    h.pipeline
        .submit(&cfg, request(candidate("b", None, "5.6.7.8", "three")))
        .await
        .unwrap();
}

#[tokio::test]
async fn rejected_submission_leaves_no_trace() {
    let h = harness(sane_defer());
    let cfg = BoardConfig {
        filters: default_rules(60, 600, 120, "flood"),
        ..BoardConfig::default()
    };

    h.pipeline
        .submit(&cfg, request(candidate("b", None, "1.2.3.4", "one")))
        .await
        .unwrap();
    let entries_after_first = h.flood.len();

    let _ = h
        .pipeline
        .submit(&cfg, request(candidate("b", None, "1.2.3.4", "two")))
        .await
        .unwrap_err();

    // No post row and no new flood entries for the rejected attempt.
    assert_eq!(h.posts.post_ids("b"), vec![1]);
    assert_eq!(h.flood.len(), entries_after_first);
}

#[tokio::test]
async fn global_dedup_rejects_repost_in_another_thread() {
    let h = harness(sane_defer());
    let cfg = BoardConfig { dedup: Some(DedupScope::Global), ..BoardConfig::default() };

    let original = h
        .pipeline
        .submit(
            &cfg,
            request(with_file(candidate("b", None, "1.1.1.1", "op"), "cat.png", b"CAT")),
        )
        .await
        .unwrap();

    let err = h
        .pipeline
        .submit(
            &cfg,
            request(with_file(candidate("b", None, "2.2.2.2", "other op"), "dog.png", b"CAT")),
        )
        .await
        .unwrap_err();

    let CoreError::Duplicate { original: hit, .. } = err else {
        panic!("expected duplicate rejection");
    };
    assert_eq!(hit.post, original.post_id);
    // Compensating cleanup: nothing left staged.
    assert_eq!(h.media.staged_count(), 0);
}

#[tokio::test]
async fn thread_dedup_allows_repost_elsewhere() {
    let h = harness(sane_defer());
    let cfg = BoardConfig { dedup: Some(DedupScope::Thread), ..BoardConfig::default() };

    let t1 = h
        .pipeline
        .submit(
            &cfg,
            request(with_file(candidate("b", None, "1.1.1.1", "op one"), "a.png", b"IMG")),
        )
        .await
        .unwrap();
    // Same content in a different thread is fine.
    h.pipeline
        .submit(
            &cfg,
            request(with_file(candidate("b", None, "1.1.1.1", "op two"), "a.png", b"IMG")),
        )
        .await
        .unwrap();

    // Same content back into the first thread is not.
    let err = h
        .pipeline
        .submit(
            &cfg,
            request(with_file(
                candidate("b", Some(t1.thread_id), "3.3.3.3", "again"),
                "a.png",
                b"IMG",
            )),
        )
        .await
        .unwrap_err();
    assert_matches!(err, CoreError::Duplicate { .. });
}

#[tokio::test]
async fn reply_at_bump_limit_still_bumps_and_hard_limit_rejects_next() {
    let h = harness(sane_defer());
    let cfg = BoardConfig {
        reply_limit: 5,
        hard_limits: HardLimits { replies: 5, images: 0 },
        ..BoardConfig::default()
    };

    let t1 = h
        .pipeline
        .submit(&cfg, request(candidate("b", None, "1.1.1.1", "thread one")))
        .await
        .unwrap();
    let t2 = h
        .pipeline
        .submit(&cfg, request(candidate("b", None, "2.2.2.2", "thread two")))
        .await
        .unwrap();
    assert_eq!(h.posts.threads_by_bump("b"), vec![t2.thread_id, t1.thread_id]);

    for i in 0..5 {
        h.pipeline
            .submit(
                &cfg,
                request(candidate("b", Some(t1.thread_id), "9.9.9.9", &format!("reply {i}"))),
            )
            .await
            .unwrap();
    }
    // The 5th reply reached the bump limit but still bumped.
    assert_eq!(h.posts.threads_by_bump("b"), vec![t1.thread_id, t2.thread_id]);

    let err = h
        .pipeline
        .submit(&cfg, request(candidate("b", Some(t1.thread_id), "9.9.9.9", "one more")))
        .await
        .unwrap_err();
    assert_matches!(err, CoreError::Validation(_));
}

#[tokio::test]
async fn sage_reply_does_not_bump() {
    let h = harness(sane_defer());
    let cfg = BoardConfig::default();

    let t1 = h
        .pipeline
        .submit(&cfg, request(candidate("b", None, "1.1.1.1", "thread one")))
        .await
        .unwrap();
    let t2 = h
        .pipeline
        .submit(&cfg, request(candidate("b", None, "2.2.2.2", "thread two")))
        .await
        .unwrap();

    let mut saged = candidate("b", Some(t1.thread_id), "9.9.9.9", "quiet reply");
    saged.email = "SAGE".to_string();
    h.pipeline.submit(&cfg, request(saged)).await.unwrap();

    assert_eq!(h.posts.threads_by_bump("b"), vec![t2.thread_id, t1.thread_id]);
}

#[tokio::test]
async fn locked_thread_rejects_all_but_moderators() {
    let h = harness(sane_defer());
    let cfg = BoardConfig::default();

    let t = h
        .pipeline
        .submit(&cfg, request(candidate("b", None, "1.1.1.1", "op")))
        .await
        .unwrap();
    h.posts.set_thread_flags(
        "b",
        t.thread_id,
        ThreadFlags { locked: true, ..ThreadFlags::default() },
    );

    let err = h
        .pipeline
        .submit(&cfg, request(candidate("b", Some(t.thread_id), "2.2.2.2", "reply")))
        .await
        .unwrap_err();
    assert_matches!(err, CoreError::Validation(_));

    let mut mod_reply = candidate("b", Some(t.thread_id), "2.2.2.2", "sticky note");
    mod_reply.moderator = true;
    h.pipeline.submit(&cfg, request(mod_reply)).await.unwrap();
}

#[tokio::test]
async fn cyclical_thread_evicts_exactly_the_oldest_replies() {
    let h = harness(sane_defer());
    let cfg = BoardConfig { cycle_keep: 3, ..BoardConfig::default() };

    let t = h
        .pipeline
        .submit(&cfg, request(candidate("b", None, "1.1.1.1", "cyclical op")))
        .await
        .unwrap();
    h.posts.set_thread_flags(
        "b",
        t.thread_id,
        ThreadFlags { cycle: true, ..ThreadFlags::default() },
    );

    let mut reply_ids = Vec::new();
    for i in 0..5 {
        let r = h
            .pipeline
            .submit(
                &cfg,
                request(with_file(
                    candidate("b", Some(t.thread_id), "9.9.9.9", &format!("reply {i}")),
                    &format!("r{i}.png"),
                    format!("IMG{i}").as_bytes(),
                )),
            )
            .await
            .unwrap();
        reply_ids.push(r.post_id);
    }

    // Only the 3 newest replies survive; the OP is untouched.
    let remaining = h.posts.reply_ids("b", t.thread_id).await.unwrap();
    assert_eq!(remaining, reply_ids[2..].to_vec());
    assert!(h.posts.post_ids("b").contains(&t.thread_id));

    // Evicted uploads were removed from media storage.
    assert_eq!(h.media.removed_paths().len(), 4); // 2 files + 2 thumbnails
}

#[tokio::test]
async fn active_ban_blocks_submission() {
    let h = harness(sane_defer());
    let cfg = BoardConfig::default();

    h.bans
        .create_ban(&sumi_core::models::NewBan {
            ip: "6.6.6.6".to_string(),
            reason: "spamming".to_string(),
            expires: None,
        })
        .await
        .unwrap();

    let err = h
        .pipeline
        .submit(&cfg, request(candidate("b", None, "6.6.6.6", "hello")))
        .await
        .unwrap_err();
    assert_matches!(err, CoreError::Banned { .. });
}

#[tokio::test]
async fn ban_action_persists_a_ban_and_rejects() {
    let h = harness(sane_defer());
    let cfg = BoardConfig {
        filters: vec![FilterRule {
            conditions: vec![FilterCondition::FieldRegex {
                field: TextField::Body,
                pattern: "(?i)buy cheap".to_string(),
            }],
            action: FilterAction::Ban {
                message: "You have been banned.".to_string(),
                reason: "advertising".to_string(),
                duration_secs: Some(3600),
            },
        }],
        ..BoardConfig::default()
    };

    let err = h
        .pipeline
        .submit(&cfg, request(candidate("b", None, "6.6.6.6", "Buy cheap pills")))
        .await
        .unwrap_err();
    assert_matches!(err, CoreError::Banned { until: Some(_), .. });

    // The persisted ban now catches even an innocent follow-up.
    let err = h
        .pipeline
        .submit(&cfg, request(candidate("b", None, "6.6.6.6", "sorry")))
        .await
        .unwrap_err();
    assert_matches!(err, CoreError::Banned { .. });
}

#[tokio::test]
async fn moderator_bypasses_filters() {
    let h = harness(sane_defer());
    let cfg = BoardConfig {
        filters: default_rules(60, 600, 120, "flood"),
        ..BoardConfig::default()
    };

    h.pipeline
        .submit(&cfg, request(candidate("b", None, "1.2.3.4", "one")))
        .await
        .unwrap();

    let mut mod_post = candidate("b", None, "1.2.3.4", "two");
    mod_post.moderator = true;
    h.pipeline.submit(&cfg, request(mod_post)).await.unwrap();
}

#[tokio::test]
async fn captcha_verdict_and_timeout_both_fail_closed() {
    let mut h = harness(sane_defer());
    h.pipeline.captcha = Some(Arc::new(StubCaptcha { ok: false }));
    let cfg = BoardConfig { require_captcha: true, ..BoardConfig::default() };

    let err = h
        .pipeline
        .submit(
            &cfg,
            SubmitRequest {
                candidate: candidate("b", None, "1.2.3.4", "hi"),
                captcha_token: Some("token".to_string()),
                file_url: None,
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, CoreError::Validation(_));

    h.pipeline.captcha = Some(Arc::new(common::HangingCaptcha));
    let cfg = BoardConfig {
        require_captcha: true,
        remote_timeout: Duration::from_millis(20),
        ..BoardConfig::default()
    };
    let err = h
        .pipeline
        .submit(
            &cfg,
            SubmitRequest {
                candidate: candidate("b", None, "1.2.3.4", "hi"),
                captcha_token: Some("token".to_string()),
                file_url: None,
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, CoreError::RemoteService(_));
}
