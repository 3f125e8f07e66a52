use anyhow::Result;
use rerank_eval_router::serialize::{read_ranks, write_ranks, write_report};
use rerank_eval_core::recall::{aggregate, GroundTruth, ZeroRelevancePolicy};

#[test]
fn test_rank_export_round_trip() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("ranks.json");

    let rank_lists = vec![vec![7, 3, 9, 2], vec![4, 8, 0, 6], vec![9, 5, 1, 3]];
    write_ranks(&path, &rank_lists)?;

    let parsed = read_ranks(&path)?;
    assert_eq!(parsed, rank_lists);

    Ok(())
}

#[test]
fn test_rank_export_preserves_empty_lists() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("ranks.json");

    let rank_lists: Vec<Vec<u32>> = vec![vec![], vec![1]];
    write_ranks(&path, &rank_lists)?;

    assert_eq!(read_ranks(&path)?, rank_lists);

    Ok(())
}

#[test]
fn test_report_export_shape() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("recall.json");

    let rank_lists = vec![vec![1, 2], vec![3, 4]];
    let ground_truth = GroundTruth::from_rows(vec![vec![1], vec![4]]);
    let report = aggregate(
        &rank_lists,
        &ground_truth,
        &[1, 2],
        ZeroRelevancePolicy::CountAsMiss,
    )?;

    write_report(&path, &report)?;

    let value: serde_json::Value = serde_json::from_reader(std::fs::File::open(&path)?)?;
    assert_eq!(value["recall"]["1"], 0.5);
    assert_eq!(value["recall"]["2"], 1.0);
    assert_eq!(value["evaluated"], 2);
    assert_eq!(value["total"], 2);
    assert_eq!(value["zero_relevance"], "count-as-miss");

    Ok(())
}
