mod common;

use std::sync::Arc;

use anyhow::Result;
use philodb_core::error::Error;
use philodb_core::partition::Partition;
use philodb_core::traits::Embedder;
use philodb_vector::{
    load_corpus, load_index, merge_parts_dir, persist_corpus, persist_index, require_all_completed, run_worker, run_workers,
    FlatIpIndex, IngestContext, RetrievalEngine, SchoolSelection, SearchParams, WorkerOutcome,
};
use tempfile::TempDir;

use common::{seven_passages, KeywordEmbedder, PoisonedEmbedder, VOCAB};

fn context(n_workers: usize, embedder: Arc<dyn Embedder>) -> Arc<IngestContext> {
    Arc::new(IngestContext::new(seven_passages(), n_workers, 2, embedder))
}

fn keyword() -> Arc<dyn Embedder> {
    Arc::new(KeywordEmbedder::new(VOCAB))
}

fn poisoned_context(n_workers: usize) -> Arc<IngestContext> {
    let mut passages = seven_passages();
    passages[5].text = "poison is here".to_string();
    let embedder: Arc<dyn Embedder> = Arc::new(PoisonedEmbedder(KeywordEmbedder::new(VOCAB)));
    Arc::new(IngestContext::new(passages, n_workers, 2, embedder))
}

fn assert_missing(err: anyhow::Error, expected_workers: usize, expected_missing: Vec<usize>) {
    match err.downcast_ref::<Error>() {
        Some(Error::IncompleteMerge { expected, missing }) => {
            assert_eq!(*expected, expected_workers);
            assert_eq!(missing, &expected_missing);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn two_workers_seven_items_merge_in_order() -> Result<()> {
    let tmp = TempDir::new()?;
    let parts = tmp.path().join("parts");
    let outcomes = run_workers(context(2, keyword()), &parts)?;
    let summaries = require_all_completed(outcomes)?;
    let ranges: Vec<Partition> = summaries.iter().map(|s| s.partition).collect();
    assert_eq!(ranges, vec![Partition { start: 0, end: 3 }, Partition { start: 3, end: 7 }]);
    assert!(parts.join("part-0000").is_dir());
    assert!(parts.join("part-0001").is_dir());

    let rt = tokio::runtime::Runtime::new()?;
    let corpus = rt.block_on(merge_parts_dir(&parts, Some(2)))?;
    let texts: Vec<String> = corpus.passages().iter().map(|p| p.text.clone()).collect();
    let expected: Vec<String> = seven_passages().into_iter().map(|p| p.text).collect();
    assert_eq!(texts, expected);
    Ok(())
}

#[test]
fn worker_count_does_not_change_the_corpus() -> Result<()> {
    let tmp = TempDir::new()?;
    let rt = tokio::runtime::Runtime::new()?;
    let mut fingerprints = Vec::new();
    for w in [1, 3, 9] {
        let parts = tmp.path().join(format!("parts-{w}"));
        require_all_completed(run_workers(context(w, keyword()), &parts)?)?;
        let corpus = rt.block_on(merge_parts_dir(&parts, Some(w)))?;
        assert_eq!(corpus.len(), 7);
        fingerprints.push(corpus.fingerprint());
    }
    assert!(fingerprints.windows(2).all(|w| w[0] == w[1]));
    Ok(())
}

#[test]
fn failed_worker_leaves_no_part_and_blocks_merge() -> Result<()> {
    let tmp = TempDir::new()?;
    let parts = tmp.path().join("parts");
    let outcomes = run_workers(poisoned_context(2), &parts)?;
    assert!(outcomes[0].is_completed());
    assert!(matches!(&outcomes[1], WorkerOutcome::Failed { ordinal: 1, error: Error::EmbeddingClientFailure(_) }));
    assert!(matches!(require_all_completed(outcomes), Err(Error::EmbeddingClientFailure(_))));
    assert!(!parts.join("part-0001").exists());
    assert!(!parts.join("part-0001.tmp").exists());

    let rt = tokio::runtime::Runtime::new()?;
    assert_missing(rt.block_on(merge_parts_dir(&parts, Some(2))).unwrap_err(), 2, vec![1]);
    Ok(())
}

#[test]
fn rerun_with_failed_worker_does_not_reuse_old_part() -> Result<()> {
    let tmp = TempDir::new()?;
    let parts = tmp.path().join("parts");
    require_all_completed(run_workers(context(2, keyword()), &parts)?)?;
    assert!(parts.join("part-0001").is_dir());

    let outcomes = run_workers(poisoned_context(2), &parts)?;
    assert!(outcomes[0].is_completed());
    assert!(!outcomes[1].is_completed());
    assert!(!parts.join("part-0001").exists());

    let rt = tokio::runtime::Runtime::new()?;
    assert_missing(rt.block_on(merge_parts_dir(&parts, Some(2))).unwrap_err(), 2, vec![1]);
    Ok(())
}

#[test]
fn separate_worker_failure_removes_its_old_part() -> Result<()> {
    let tmp = TempDir::new()?;
    let parts = tmp.path().join("parts");
    require_all_completed(run_workers(context(2, keyword()), &parts)?)?;

    let ctx = poisoned_context(2);
    assert!(run_worker(&ctx, &parts, 0).is_completed());
    assert!(matches!(
        run_worker(&ctx, &parts, 1),
        WorkerOutcome::Failed { ordinal: 1, error: Error::EmbeddingClientFailure(_) }
    ));
    assert!(!parts.join("part-0001").exists());

    let rt = tokio::runtime::Runtime::new()?;
    assert_missing(rt.block_on(merge_parts_dir(&parts, Some(2))).unwrap_err(), 2, vec![1]);
    Ok(())
}

#[test]
fn parts_from_an_earlier_input_are_rejected() -> Result<()> {
    let tmp = TempDir::new()?;
    let parts = tmp.path().join("parts");
    require_all_completed(run_workers(context(2, keyword()), &parts)?)?;

    let mut passages = seven_passages();
    passages[0].text = "Justice is love.".to_string();
    let ctx = IngestContext::new(passages, 2, 2, keyword());
    assert!(run_worker(&ctx, &parts, 0).is_completed());

    let rt = tokio::runtime::Runtime::new()?;
    let err = rt.block_on(merge_parts_dir(&parts, Some(2))).unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::PartitionMismatch(_))));
    Ok(())
}

#[test]
fn rerun_with_fewer_workers_starts_clean() -> Result<()> {
    let tmp = TempDir::new()?;
    let parts = tmp.path().join("parts");
    require_all_completed(run_workers(context(3, keyword()), &parts)?)?;
    assert!(parts.join("part-0002").is_dir());

    require_all_completed(run_workers(context(2, keyword()), &parts)?)?;
    assert!(!parts.join("part-0002").exists());

    let rt = tokio::runtime::Runtime::new()?;
    let corpus = rt.block_on(merge_parts_dir(&parts, Some(2)))?;
    assert_eq!(corpus.len(), 7);
    assert_eq!(corpus.passages()[0].text, "Justice is fairness.");
    Ok(())
}

#[test]
fn parts_from_different_runs_do_not_merge() -> Result<()> {
    let tmp = TempDir::new()?;
    let two = tmp.path().join("two");
    let three = tmp.path().join("three");
    require_all_completed(run_workers(context(2, keyword()), &two)?)?;
    require_all_completed(run_workers(context(3, keyword()), &three)?)?;
    std::fs::rename(three.join("part-0002"), two.join("part-0002"))?;

    let rt = tokio::runtime::Runtime::new()?;
    let err = rt.block_on(merge_parts_dir(&two, None)).unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::PartitionMismatch(_))));
    Ok(())
}

#[tokio::test]
async fn corpus_and_index_survive_reload() -> Result<()> {
    let tmp = TempDir::new()?;
    let parts = tmp.path().join("parts");
    let corpus_dir = tmp.path().join("corpus");
    let index_dir = tmp.path().join("index");
    let ctx = context(2, keyword());
    let ctx_for_pool = ctx.clone();
    let parts_for_pool = parts.clone();
    let outcomes = tokio::task::spawn_blocking(move || run_workers(ctx_for_pool, &parts_for_pool)).await??;
    require_all_completed(outcomes)?;

    let corpus = merge_parts_dir(&parts, Some(2)).await?;
    persist_corpus(&corpus_dir, &corpus, 2).await?;
    let index = FlatIpIndex::build(&corpus);
    persist_index(&index_dir, &index).await?;

    let corpus2 = load_corpus(&corpus_dir).await?;
    let index2 = load_index(&index_dir).await?;
    assert_eq!(corpus2, corpus);
    index2.check_alignment(&corpus2)?;
    for i in 0..corpus2.len() {
        assert_eq!(index2.row(i), index.row(i));
    }
    assert!(!tmp.path().join("corpus.tmp").exists());

    let engine = RetrievalEngine::open(&corpus_dir, &index_dir, ctx.embedder.clone(), SearchParams::default()).await?;
    let cards = engine.search("What is justice?", &SchoolSelection::All)?;
    assert_eq!(cards[0].school, "stoicism");
    assert_eq!(cards[0].hits[0].passage.text, "Justice is fairness.");
    Ok(())
}

#[tokio::test]
async fn stale_index_is_rejected() -> Result<()> {
    let tmp = TempDir::new()?;
    let corpus_dir = tmp.path().join("corpus");
    let index_dir = tmp.path().join("index");
    let embedder = keyword();
    let texts: Vec<String> = seven_passages().iter().map(|p| p.text.clone()).collect();
    let vectors = embedder.encode(&texts, true)?;
    let full = philodb_core::types::Corpus::new(embedder.dim(), seven_passages(), vectors.clone())?;
    let smaller = philodb_core::types::Corpus::new(embedder.dim(), seven_passages()[..6].to_vec(), vectors[..6].to_vec())?;

    persist_index(&index_dir, &FlatIpIndex::build(&smaller)).await?;
    persist_corpus(&corpus_dir, &full, 1).await?;
    let err = RetrievalEngine::open(&corpus_dir, &index_dir, embedder, SearchParams::default()).await.err().unwrap();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::IndexAlignment(_))));
    Ok(())
}
