use std::fs;
use std::path::Path;

use hyporank::scoring::{
    aggregate_composition, aggregate_ranking, convert_rounds, score_composition, score_ranking,
    ModelSuffixMap, RankingTable,
};
use serde_json::{json, Value};

const LONG_A: &str = "Doping the lattice with cerium suppresses phase segregation.";
const LONG_B: &str = "A self-assembled monolayer passivates grain boundaries.";

fn record(content: &str, score: f64, round: i64) -> Value {
    json!([content, "i1", "i2", null, null, null, null, score, null, round])
}

fn write_eval(dir: &Path, name: &str, records: Vec<Value>) {
    let doc = json!(["background", "inspirations", records]);
    fs::write(dir.join(name), serde_json::to_string(&doc).unwrap()).unwrap();
}

fn cats(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// Suffixes of ten generating models; one paper folder holds one file each.
const MODELS: [&str; 10] = [
    "4o",
    "4omini",
    "claude35haiku",
    "claude35sonnet",
    "deepseek",
    "gemini2flash",
    "gemini2flashthinking",
    "llama318b",
    "llama321b",
    "llama3170b",
];

/// Write a complete paper folder. Models not listed in `scored` get a single
/// valid hypothesis scored 1.
fn write_paper(dir: &Path, scored: &[(&str, Vec<Value>)]) {
    fs::create_dir_all(dir).unwrap();
    for model in MODELS {
        let records = scored
            .iter()
            .find(|(m, _)| *m == model)
            .map(|(_, r)| r.clone())
            .unwrap_or_else(|| vec![record(LONG_A, 1.0, 0)]);
        write_eval(dir, &format!("eval_res_{model}.json"), records);
    }
}

fn csv_row<'a>(text: &'a str, model: &str) -> Vec<&'a str> {
    text.lines()
        .find(|l| l.starts_with(&format!("{model},")))
        .unwrap_or_else(|| panic!("no row for {model} in {text}"))
        .split(',')
        .collect()
}

#[test]
fn composition_pipeline_end_to_end() {
    let root = tempfile::tempdir().unwrap();
    let chemistry = root.path().join("Chemistry");
    write_paper(
        &chemistry.join("paper_1"),
        &[
            (
                "4o",
                vec![
                    record(LONG_A, 2.0, 0),
                    record(LONG_A, 4.0, 1),
                    record(LONG_B, 6.0, 1),
                    record("too short", 9.0, 1),
                ],
            ),
            ("deepseek", vec![record(LONG_B, 3.0, 2), record(LONG_A, 0.0, 2)]),
        ],
    );
    write_paper(
        &chemistry.join("paper_2"),
        &[
            ("4o", vec![record(LONG_A, 7.0, 0)]),
            ("deepseek", vec![record(LONG_B, 5.0, 1)]),
        ],
    );
    // Incomplete folder is left alone.
    let partial = chemistry.join("paper_3");
    fs::create_dir_all(&partial).unwrap();
    write_eval(&partial, "eval_res_4o.json", vec![record(LONG_A, 1.0, 0)]);
    write_paper(
        &root.path().join("Physics").join("paper_1"),
        &[("4o", vec![record(LONG_A, 10.0, 0)])],
    );

    let summary = convert_rounds(root.path(), &cats(&["Chemistry", "Physics", "Missing"]), 10);
    assert_eq!(summary.folders, 4);
    assert_eq!(summary.converted, 30);
    assert_eq!(summary.incomplete, 1);
    assert!(!partial.join("score_res_4o.json").exists());

    let converted: Value = serde_json::from_str(
        &fs::read_to_string(chemistry.join("paper_1/score_res_4o.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(converted["round 1"]["hypothesis 1"]["content"], "too short");
    assert_eq!(converted["round 1"]["hypothesis 2"]["content"], LONG_B);
    assert_eq!(converted["round 1"]["hypothesis 3"]["content"], LONG_A);
    assert_eq!(converted["round 0"]["hypothesis 1"]["ground_truth_score"], 2.0);

    // Second pass finds everything in place.
    let again = convert_rounds(root.path(), &cats(&["Chemistry", "Physics"]), 10);
    assert_eq!(again.converted, 0);
    assert_eq!(again.existing, 30);

    let outputs = score_composition(
        root.path(),
        &cats(&["Chemistry", "Physics"]),
        &ModelSuffixMap::default(),
    )
    .unwrap();
    assert_eq!(outputs.len(), 2);
    let table = &outputs[0].table;
    assert_eq!(table.len(), 10);
    // Final round of paper 1 is (4 + 6) / 2 with the short one filtered,
    // paper 2 has a single 7.
    assert_eq!(table["gpt-4o-2024-11-20"].avg_score, 6.0);
    assert_eq!(table["gpt-4o-2024-11-20"].count, 2);
    // Zero scores are filtered: (3 + 5) / 2.
    assert_eq!(table["DeepSeek-V3"].avg_score, 4.0);
    assert_eq!(table["gpt-4o-mini-2024-07-18"].avg_score, 1.0);

    let csv = fs::read_to_string(chemistry.join("model_generate_score.csv")).unwrap();
    assert!(csv.starts_with("model,avg_score,count,totle_score\r\n"));
    assert!(csv.contains("gpt-4o-2024-11-20,6,2,12\r\n"));
    assert!(csv.contains("DeepSeek-V3,4,2,8\r\n"));

    let (path, global) =
        aggregate_composition(root.path(), &cats(&["Chemistry", "Physics", "Law"])).unwrap();
    assert_eq!(path, root.path().join("model_generate_score.csv"));
    // Chemistry 12 over 2 plus Physics 10 over 1.
    let gpt = &global["gpt-4o-2024-11-20"];
    assert_eq!(gpt.count, 3);
    assert_eq!(gpt.total_score, 22.0);
    assert!((gpt.avg_score - 22.0 / 3.0).abs() < 1e-12);

    let text = fs::read_to_string(&path).unwrap();
    let row = csv_row(&text, "gpt-4o-2024-11-20");
    let avg: f64 = row[1].parse().unwrap();
    let count: f64 = row[2].parse().unwrap();
    let total: f64 = row[3].parse().unwrap();
    assert_eq!(count, 3.0);
    assert!((total / count - avg).abs() < 1e-12);
    assert_eq!(csv_row(&text, "DeepSeek-V3")[2], "3");
}

#[test]
fn unmapped_model_suffix_is_left_out() {
    let root = tempfile::tempdir().unwrap();
    let paper = root.path().join("Biology").join("paper_1");
    write_paper(&paper, &[]);
    write_eval(&paper, "eval_res_gpt5.json", vec![record(LONG_A, 9.0, 0)]);

    let summary = convert_rounds(root.path(), &cats(&["Biology"]), 10);
    assert_eq!(summary.converted, 11);
    assert!(paper.join("score_res_gpt5.json").exists());

    let outputs =
        score_composition(root.path(), &cats(&["Biology"]), &ModelSuffixMap::default()).unwrap();
    let table = &outputs[0].table;
    assert_eq!(table.len(), 10);
    assert!(table.values().all(|r| r.avg_score == 1.0 && r.count == 1));

    let csv = fs::read_to_string(&outputs[0].path).unwrap();
    assert_eq!(csv.lines().count(), 11);
    assert!(!csv.contains(",9,"));
}

#[test]
fn broken_score_files_are_skipped_and_tables_still_written() {
    let root = tempfile::tempdir().unwrap();
    let chemistry = root.path().join("Chemistry");
    write_paper(&chemistry.join("paper_1"), &[("4o", vec![record(LONG_A, 4.0, 0)])]);
    write_paper(&chemistry.join("paper_2"), &[("4o", vec![record(LONG_A, 8.0, 0)])]);
    convert_rounds(root.path(), &cats(&["Chemistry"]), 10);

    fs::write(chemistry.join("paper_1/score_res_4o.json"), "{ not json").unwrap();
    fs::write(chemistry.join("paper_1/score_res_deepseek.json"), b"\xff\xfe\x00").unwrap();
    fs::write(chemistry.join("paper_1/score_res_4omini.json"), r#"{"x": 1}"#).unwrap();

    let outputs =
        score_composition(root.path(), &cats(&["Chemistry"]), &ModelSuffixMap::default()).unwrap();
    let table = &outputs[0].table;
    assert_eq!(table["gpt-4o-2024-11-20"].count, 1);
    assert_eq!(table["gpt-4o-2024-11-20"].avg_score, 8.0);
    assert_eq!(table["DeepSeek-V3"].count, 1);
    assert_eq!(table["gpt-4o-mini-2024-07-18"].count, 1);
    assert_eq!(table["claude-3-5-haiku-20241022"].count, 2);
    let csv = fs::read_to_string(chemistry.join("model_generate_score.csv")).unwrap();
    assert!(csv.contains("gpt-4o-2024-11-20,8,1,8\r\n"));

    let model_dir = root.path().join("Law/fan_1_res/gpt-4o");
    fs::create_dir_all(&model_dir).unwrap();
    fs::write(model_dir.join("ranking_res_0.json"), r#"{"Rank": 8}"#).unwrap();
    fs::write(model_dir.join("ranking_res_1.json"), "{ not json").unwrap();
    fs::write(model_dir.join("ranking_res_2.json"), r#"{"Rank": "high"}"#).unwrap();
    fs::write(model_dir.join("ranking_res_3.json"), b"\xff\xfe").unwrap();

    let outputs = score_ranking(root.path(), &cats(&["Law"]), "fan_1_res", 16).unwrap();
    assert_eq!(outputs[0].table["gpt-4o"].count, 1);
    let csv = fs::read_to_string(root.path().join("Law/llm_ranking.csv")).unwrap();
    assert!(csv.contains("gpt-4o,0.5,1\r\n"));
}

#[test]
fn folders_below_min_eval_files_are_not_converted() {
    let root = tempfile::tempdir().unwrap();
    let physics = root.path().join("Physics");
    let small = physics.join("paper_small");
    fs::create_dir_all(&small).unwrap();
    for model in &MODELS[..3] {
        write_eval(&small, &format!("eval_res_{model}.json"), vec![record(LONG_A, 2.0, 0)]);
    }
    write_paper(&physics.join("paper_full"), &[]);

    let summary = convert_rounds(root.path(), &cats(&["Physics"]), 10);
    assert_eq!(summary.folders, 2);
    assert_eq!(summary.incomplete, 1);
    assert_eq!(summary.converted, 10);
    let leftovers = fs::read_dir(&small)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with("score_res_"))
        .count();
    assert_eq!(leftovers, 0);

    // A lower threshold picks the small folder up without redoing the rest.
    let summary = convert_rounds(root.path(), &cats(&["Physics"]), 3);
    assert_eq!(summary.incomplete, 0);
    assert_eq!(summary.converted, 3);
    assert_eq!(summary.existing, 10);
}

#[test]
fn ranking_pipeline_end_to_end() {
    let root = tempfile::tempdir().unwrap();
    for (cat, model, ranks) in [
        ("Physics", "gpt-4o", vec![16, 8]),
        ("Physics", "llama", vec![0]),
        ("Law", "gpt-4o", vec![4, 4, 4, 4]),
    ] {
        let dir = root.path().join(cat).join("fan_1_res").join(model);
        fs::create_dir_all(&dir).unwrap();
        for (i, rank) in ranks.iter().enumerate() {
            fs::write(
                dir.join(format!("ranking_res_{i}.json")),
                json!({"Rank": rank}).to_string(),
            )
            .unwrap();
        }
    }

    let categories = cats(&["Physics", "Law"]);
    score_ranking(root.path(), &categories, "fan_1_res", 16).unwrap();
    let physics = fs::read_to_string(root.path().join("Physics/llm_ranking.csv")).unwrap();
    assert!(physics.contains("gpt-4o,0.75,2\r\n"));
    assert!(physics.contains("llama,0,1\r\n"));

    let (_, global) =
        aggregate_ranking(root.path(), &categories, RankingTable::Counts, None).unwrap();
    // (0.75 * 2 + 0.25 * 4) / 6
    assert!((global["gpt-4o"].avg_score - 2.5 / 6.0).abs() < 1e-12);
    assert_eq!(global["gpt-4o"].count, 6);
    let text = fs::read_to_string(root.path().join("avg_llm_ranking.csv")).unwrap();
    assert!(text.starts_with("model_name,avg_rank,count3\r\n"));

    let (path, _) = aggregate_ranking(
        root.path(),
        &categories,
        RankingTable::PerCategory,
        Some(Path::new("custom.csv")),
    )
    .unwrap();
    assert_eq!(path, root.path().join("custom.csv"));
    let text = fs::read_to_string(path).unwrap();
    assert!(text.starts_with("model_name,avg_rank,Physics,Law\r\n"));
    assert!(text.contains("\r\nllama,0,0,\r\n"));
}
