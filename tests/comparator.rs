use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use hyporank::gateway::ProviderError;
use hyporank::oracle::{AskContext, Oracle, OracleError, OracleReply};
use hyporank::ranking::{
    CandidateKind, ComparisonError, ComparisonTask, PairwiseComparator, Verdict,
};

/// Replays scripted replies, then repeats the last one.
struct ScriptedOracle {
    replies: Mutex<VecDeque<OracleReply>>,
    last: Mutex<Option<OracleReply>>,
    calls: AtomicU32,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedOracle {
    fn new(replies: Vec<OracleReply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            last: Mutex::new(None),
            calls: AtomicU32::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn ask(&self, prompt: &str, _ctx: &AskContext) -> Result<OracleReply, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        let next = self.replies.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        if let Some(reply) = next {
            *last = Some(reply);
        }
        Ok(last.clone().unwrap_or(OracleReply::Text(String::new())))
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

struct FailingOracle;

#[async_trait]
impl Oracle for FailingOracle {
    async fn ask(&self, _prompt: &str, _ctx: &AskContext) -> Result<OracleReply, OracleError> {
        Err(OracleError::Transport(ProviderError::RetriesExhausted {
            attempts: 1000,
            last: Box::new(ProviderError::provider("chat", "down")),
        }))
    }

    fn model(&self) -> &str {
        "failing"
    }
}

fn text(s: &str) -> OracleReply {
    OracleReply::Text(s.to_string())
}

fn task() -> ComparisonTask<'static> {
    ComparisonTask {
        index: 0,
        kind: CandidateKind::Model,
        question: "How can perovskite cells be stabilised?",
        main_hypothesis: "MAIN HYPOTHESIS",
        candidate: "CANDIDATE HYPOTHESIS",
    }
}

#[tokio::test]
async fn always_unparseable_falls_back_after_ten_attempts() {
    let oracle = ScriptedOracle::new(vec![text("I cannot decide between these.")]);
    let comparator = PairwiseComparator::new(oracle.clone());

    let outcome = comparator.compare(&task(), &AskContext::default()).await.unwrap();
    assert_eq!(outcome.verdict, Verdict::PrefersMain);
    assert!(outcome.fell_back);
    assert_eq!(outcome.attempts, 10);
    assert_eq!(oracle.calls(), 10);
}

#[tokio::test]
async fn prompt_too_large_counts_toward_budget() {
    let oracle = ScriptedOracle::new(vec![OracleReply::PromptTooLarge]);
    let comparator = PairwiseComparator::new(oracle.clone()).with_max_attempts(4);

    let outcome = comparator.compare(&task(), &AskContext::default()).await.unwrap();
    assert_eq!(outcome.verdict, Verdict::PrefersMain);
    assert_eq!(outcome.prompt_too_large_hits, 4);
    assert_eq!(oracle.calls(), 4);
}

#[tokio::test]
async fn retries_until_a_verdict_parses() {
    let oracle = ScriptedOracle::new(vec![
        text("garbage"),
        OracleReply::PromptTooLarge,
        text("**Analysis**: ...\n**Selection of research hypothesis candidate**: candidate 2"),
    ]);
    let comparator = PairwiseComparator::new(oracle.clone());

    let outcome = comparator.compare(&task(), &AskContext::default()).await.unwrap();
    assert_eq!(outcome.verdict, Verdict::PrefersCandidate);
    assert!(!outcome.fell_back);
    assert_eq!(outcome.attempts, 3);
    assert_eq!(outcome.prompt_too_large_hits, 1);
    assert_eq!(oracle.calls(), 3);
}

#[tokio::test]
async fn main_hypothesis_is_rendered_in_slot_one() {
    let oracle = ScriptedOracle::new(vec![text(
        "Selection of research hypothesis candidate: candidate 1",
    )]);
    let comparator = PairwiseComparator::new(oracle.clone());
    comparator.compare(&task(), &AskContext::default()).await.unwrap();

    let prompts = oracle.prompts.lock().unwrap();
    let prompt = &prompts[0];
    assert!(prompt.contains("candidate 1 is: MAIN HYPOTHESIS"));
    assert!(prompt.contains("candidate 2 is: CANDIDATE HYPOTHESIS"));
}

#[tokio::test]
async fn transport_failure_is_not_a_verdict() {
    let comparator = PairwiseComparator::new(Arc::new(FailingOracle));
    let err = comparator
        .compare(&task(), &AskContext::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ComparisonError::Oracle(_)));
}
