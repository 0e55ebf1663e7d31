use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hyporank::gateway::ProviderError;
use hyporank::oracle::{AskContext, Oracle, OracleError, OracleReply};
use hyporank::ranking::{
    EvaluationUnit, JsonlTraceSink, PairwiseComparator, Tournament, TournamentConfig,
    TournamentError, TraceSink, UnitId,
};

const PREFERS_MAIN: &str = "**Selection of research hypothesis candidate**: candidate 1";
const PREFERS_CANDIDATE: &str = "**Selection of research hypothesis candidate**: candidate 2";

/// Judges by candidate text: prefers the candidate when it is listed.
struct PreferListed {
    winners: HashSet<String>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    fail_on: Option<String>,
}

impl PreferListed {
    fn new(winners: &[&str]) -> Self {
        Self {
            winners: winners.iter().map(|s| s.to_string()).collect(),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            fail_on: None,
        }
    }
}

fn candidate_of(prompt: &str) -> &str {
    let marker = "Research hypothesis candidate 2 is: ";
    let start = prompt.find(marker).map(|i| i + marker.len()).unwrap_or(0);
    let rest = &prompt[start..];
    rest.split('\n').next().unwrap_or(rest)
}

#[async_trait]
impl Oracle for PreferListed {
    async fn ask(&self, prompt: &str, _ctx: &AskContext) -> Result<OracleReply, OracleError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let candidate = candidate_of(prompt);
        if self.fail_on.as_deref() == Some(candidate) {
            return Err(OracleError::Transport(ProviderError::provider(
                "stub",
                "judge unavailable",
            )));
        }
        let reply = if self.winners.contains(candidate) {
            PREFERS_CANDIDATE
        } else {
            PREFERS_MAIN
        };
        Ok(OracleReply::Text(reply.to_string()))
    }

    fn model(&self) -> &str {
        "prefer-listed"
    }
}

fn unit(fakes: usize, models: usize) -> EvaluationUnit {
    EvaluationUnit {
        id: UnitId::new("u1"),
        question: "What limits catalyst lifetime?".into(),
        main_hypothesis: "main".into(),
        fake_hypotheses: (1..=fakes).map(|i| format!("cand-{i}")).collect(),
        model_hypotheses: (fakes + 1..=fakes + models)
            .map(|i| format!("cand-{i}"))
            .collect(),
    }
}

fn tournament(oracle: PreferListed, concurrency: usize) -> (Tournament, Arc<PreferListed>) {
    let oracle = Arc::new(oracle);
    let comparator = PairwiseComparator::new(oracle.clone());
    let config = TournamentConfig {
        r_max: 16,
        comparison_concurrency: concurrency,
    };
    (
        Tournament::new(Arc::new(comparator), config).unwrap(),
        oracle,
    )
}

#[tokio::test]
async fn always_main_keeps_r_max_for_any_pool_size() {
    for n in [0usize, 1, 5, 16, 20] {
        let (t, _) = tournament(PreferListed::new(&[]), 15);
        let out = t.rank(&unit(n / 2, n - n / 2)).await.unwrap();
        assert_eq!(out.result.rank, 16, "pool size {n}");
        assert_eq!(out.stats.comparisons, n);
    }
}

#[tokio::test]
async fn always_candidate_subtracts_pool_size_and_clamps() {
    for n in [1usize, 3, 16, 20] {
        let names: Vec<String> = (1..=n).map(|i| format!("cand-{i}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let (t, _) = tournament(PreferListed::new(&refs), 15);
        let out = t.rank(&unit(0, n)).await.unwrap();
        assert_eq!(out.result.rank, 16u32.saturating_sub(n as u32), "pool size {n}");
        assert!(out.result.rank <= 16);
    }
}

#[tokio::test]
async fn three_fake_thirteen_model_two_losses_gives_fourteen() {
    let (t, _) = tournament(PreferListed::new(&["cand-3", "cand-9"]), 15);
    let u = unit(3, 13);
    let out = t.rank(&u).await.unwrap();
    assert_eq!(out.result.rank, 14);
    assert_eq!(out.stats.candidate_wins, 2);
    assert_eq!(out.result.fake_hypotheses, u.fake_hypotheses);
    assert_eq!(out.result.model_hypotheses, u.model_hypotheses);
    assert_eq!(out.result.main_hypothesis, "main");
}

#[tokio::test]
async fn fan_out_respects_concurrency_limit() {
    let (t, oracle) = tournament(PreferListed::new(&[]), 3);
    t.rank(&unit(4, 8)).await.unwrap();
    let peak = oracle.max_in_flight.load(Ordering::SeqCst);
    assert!(peak <= 3, "peak {peak}");
    assert!(peak >= 1);
}

#[tokio::test]
async fn one_failed_comparison_fails_the_unit() {
    let mut oracle = PreferListed::new(&[]);
    oracle.fail_on = Some("cand-4".into());
    let (t, _) = tournament(oracle, 15);
    let err = t.rank(&unit(2, 4)).await.unwrap_err();
    match err {
        TournamentError::Comparison { index, .. } => assert_eq!(index, 3),
        other => panic!("expected Comparison error, got {other:?}"),
    }
}

#[tokio::test]
async fn trace_records_every_comparison() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trace.jsonl");
    let (sink, worker) = JsonlTraceSink::new(&path).unwrap();
    let sink: Arc<dyn TraceSink> = Arc::new(sink);

    let (t, _) = tournament(PreferListed::new(&["cand-2"]), 4);
    let t = t.with_trace(sink);
    let mut u = unit(1, 2);
    u.id = UnitId::new("10.1021/ACS_x");
    t.rank(&u).await.unwrap();
    drop(t);
    worker.join().unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let events: Vec<serde_json::Value> = text
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(events.len(), 3);
    let winner = events
        .iter()
        .find(|e| e["candidate_index"] == 1)
        .unwrap();
    assert_eq!(winner["verdict"], "prefers_candidate");
    assert_eq!(winner["candidate_kind"], "model");
    assert_eq!(winner["unit_id"], "10.1021/ACS_x");
    assert_eq!(winner["doc_id"], "101021acsx");
    assert_eq!(winner["model"], "prefer-listed");
    assert_eq!(winner["prompt_hash"].as_str().unwrap().len(), 64);
}

#[test]
fn zero_concurrency_is_rejected() {
    let comparator = PairwiseComparator::new(Arc::new(PreferListed::new(&[])));
    let config = TournamentConfig {
        r_max: 16,
        comparison_concurrency: 0,
    };
    assert!(matches!(
        Tournament::new(Arc::new(comparator), config),
        Err(TournamentError::InvalidConfig(_))
    ));
}
