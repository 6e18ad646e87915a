// tests/audit_replay.rs
//
// Retraining from logged submissions, including a full Bayes feedback loop.

mod common;

use common::{anonymous_comment, engine, Behavior, Scripted};
use spam_karma::config::{BayesConfig, Policy};
use spam_karma::storage::Database;
use spam_karma::strategy::bayes::BayesStrategy;
use spam_karma::{FilterSystem, SpamError, StrategySet};

#[tokio::test]
async fn retraining_unknown_entry_is_not_found() {
    let fs = engine(Policy::default(), &[]);
    let err = fs.retrain(404, true).await.unwrap_err();
    assert!(matches!(err, SpamError::LogEntryNotFound(404)));
}

#[tokio::test]
async fn logged_request_is_replayed_without_cookies() {
    let local = Scripted::new("Regex", Behavior::Abstain);
    let fs = engine(Policy::default(), &[local.clone()]);
    let d = fs.evaluate(anonymous_comment("buy pills")).await.unwrap();
    let id = d.log_id.unwrap();

    let summary = fs.retrain(id, true).await.unwrap();
    assert_eq!(summary.trained, vec!["Regex".to_string()]);

    let trained = local.trained.lock();
    let (input, is_spam) = &trained[0];
    assert!(*is_spam);
    assert_eq!(input.content, "buy pills");
    assert_eq!(input.author, "visitor");
    assert_eq!(input.ip, "203.0.113.5");
    assert_eq!(input.request.method, "POST");
    assert_eq!(input.request.path, "/ticket/7");
    assert!(input.request.header("Cookie").is_none());
    assert_eq!(input.request.header("User-Agent"), Some("Mozilla/5.0"));
}

#[tokio::test]
async fn external_training_needs_both_gates() {
    for (use_external, train_external, expect_trained) in
        [(true, true, true), (true, false, false), (false, true, false)]
    {
        let policy = Policy {
            use_external,
            train_external,
            ..Policy::default()
        };
        let remote = Scripted::external("Akismet", Behavior::Abstain);
        let local = Scripted::new("Bayes", Behavior::Abstain);
        let fs = engine(policy, &[remote.clone(), local.clone()]);
        let id = fs.evaluate(anonymous_comment("hello")).await.unwrap().log_id.unwrap();

        let summary = fs.retrain(id, false).await.unwrap();
        assert_eq!(local.trained.lock().len(), 1);
        assert_eq!(remote.trained.lock().len(), usize::from(expect_trained));
        if expect_trained {
            assert_eq!(summary.trained, vec!["Akismet".to_string(), "Bayes".to_string()]);
            assert!(summary.skipped.is_empty());
        } else {
            assert_eq!(summary.trained, vec!["Bayes".to_string()]);
            assert_eq!(summary.skipped, vec!["Akismet".to_string()]);
        }
    }
}

#[tokio::test]
async fn training_failures_are_reported_and_label_still_applies() {
    let broken = Scripted::new("Broken", Behavior::FailTraining);
    let fine = Scripted::new("Fine", Behavior::Abstain);
    let fs = engine(Policy::default(), &[broken, fine.clone()]);
    let d = fs.evaluate(anonymous_comment("hello")).await.unwrap();
    assert!(!d.rejected);
    let id = d.log_id.unwrap();

    let summary = fs.retrain(id, true).await.unwrap();
    assert_eq!(summary.failed, vec!["Broken".to_string()]);
    assert_eq!(summary.trained, vec!["Fine".to_string()]);
    assert!(fs.audit_log().fetch(id).unwrap().unwrap().rejected);

    fs.retrain(id, false).await.unwrap();
    assert!(!fs.audit_log().fetch(id).unwrap().unwrap().rejected);
}

fn bayes_engine(min_training: u64) -> FilterSystem {
    let db = Database::open_in_memory().unwrap();
    let bayes = BayesStrategy::new(
        &BayesConfig {
            enabled: true,
            karma: 10,
            min_training,
        },
        db.classifier(),
    );
    FilterSystem::new(Policy::default(), StrategySet::new().with(bayes), db)
}

#[tokio::test]
async fn admin_feedback_teaches_the_classifier() {
    let fs = bayes_engine(1);
    let spam = "cheap viagra pills online casino";
    let ham = "patch fixes parser crash when loading module";

    // untrained: the classifier abstains
    let first = fs.evaluate(anonymous_comment(spam)).await.unwrap();
    assert_eq!(first.score, 0);
    assert!(!first.rejected);

    let ham_entry = fs.evaluate(anonymous_comment(ham)).await.unwrap();
    fs.retrain(first.log_id.unwrap(), true).await.unwrap();
    fs.retrain(ham_entry.log_id.unwrap(), false).await.unwrap();

    let totals = fs.database().classifier().totals().unwrap();
    assert_eq!((totals.nspam, totals.nham), (1, 1));

    let again = fs.evaluate(anonymous_comment(spam)).await.unwrap();
    assert!(again.rejected);
    assert!(again.score < 0);
    assert_eq!(again.reasons[0].strategy, "Bayes");
    assert!(again.reasons[0].message.starts_with("SpamBayes determined spam probability of"));

    let clean = fs.evaluate(anonymous_comment(ham)).await.unwrap();
    assert!(!clean.rejected);
    assert!(clean.score > 0);
}

#[tokio::test]
async fn classifier_waits_for_minimum_training() {
    let fs = bayes_engine(25);
    let d = fs.evaluate(anonymous_comment("cheap viagra pills")).await.unwrap();
    fs.retrain(d.log_id.unwrap(), true).await.unwrap();

    let d = fs.evaluate(anonymous_comment("cheap viagra pills")).await.unwrap();
    assert_eq!(d.score, 0);
    assert!(d.reasons.is_empty());
}
