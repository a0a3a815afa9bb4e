//! Filter and project a batch of cards from one set on several threads
//!
//! The batch is split into contiguous chunks, one per worker, and the results
//! are re-joined in chunk order, so output order equals input order.

use crate::error::FilterSpecError;
use crate::filter::Filter;
use crate::progress::ProgressState;
use crate::project::Projector;
use crate::types::{Card, CardRecord};
use std::panic;

/// Outcome for each record of the batch: `Some(card)` if it survived the filter
pub fn evaluate_batch(
    filter: &Filter,
    projector: &Projector,
    progress: &ProgressState,
    records: Vec<CardRecord>,
    workers: usize,
) -> Result<Vec<Option<Card>>, FilterSpecError> {
    let workers = workers.max(1);
    if workers == 1 || records.len() < 2 {
        return evaluate_chunk(filter, projector, progress, records);
    }

    let chunk_size = (records.len() + workers - 1) / workers;
    let mut chunks: Vec<Vec<CardRecord>> = Vec::with_capacity(workers);
    let mut records = records.into_iter().peekable();
    while records.peek().is_some() {
        chunks.push(records.by_ref().take(chunk_size).collect());
    }

    let results = std::thread::scope(|s| {
        let handles: Vec<_> = chunks
            .into_iter()
            .map(|chunk| s.spawn(move || evaluate_chunk(filter, projector, progress, chunk)))
            .collect();

        handles
            .into_iter()
            .map(|handle| match handle.join() {
                Ok(result) => result,
                Err(payload) => panic::resume_unwind(payload),
            })
            .collect::<Vec<_>>()
    });

    let mut out = Vec::new();
    for chunk in results {
        out.extend(chunk?);
    }
    Ok(out)
}

fn evaluate_chunk(
    filter: &Filter,
    projector: &Projector,
    progress: &ProgressState,
    records: Vec<CardRecord>,
) -> Result<Vec<Option<Card>>, FilterSpecError> {
    let mut out = Vec::with_capacity(records.len());
    for record in records {
        progress.record_seen();
        if filter.matches(&record.card)? {
            progress.record_matched();
            out.push(Some(projector.project(record.card)));
        } else {
            out.push(None);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::compile_filter;
    use crate::project::ProjectionSchema;
    use serde_json::json;
    use std::sync::Arc;

    fn records(n: usize) -> Vec<CardRecord> {
        (0..n)
            .map(|i| {
                let card: Card = serde_json::from_value(json!({"name": format!("Card {}", i), "number": i, "power": "*"}))
                    .unwrap();
                CardRecord::new(Arc::from("BIG"), None, i, card)
            })
            .collect()
    }

    #[test]
    fn test_parallel_keeps_input_order() {
        let filter = compile_filter(&json!({"number": {"gte": 10}})).unwrap();
        let projector = Projector::new(ProjectionSchema::new(["name"]));
        let progress = ProgressState::new();

        let out = evaluate_batch(&filter, &projector, &progress, records(100), 4).unwrap();
        assert_eq!(out.len(), 100);
        assert!(out[..10].iter().all(Option::is_none));
        let names: Vec<String> = out
            .iter()
            .flatten()
            .map(|card| card["name"].as_str().unwrap().to_string())
            .collect();
        let expected: Vec<String> = (10..100).map(|i| format!("Card {}", i)).collect();
        assert_eq!(names, expected);

        let snapshot = progress.snapshot();
        assert_eq!(snapshot.records_seen, 100);
        assert_eq!(snapshot.records_matched, 90);
    }

    #[test]
    fn test_worker_error_is_returned() {
        let filter = compile_filter(&json!({"power": {"gt": 1}})).unwrap();
        let projector = Projector::default();
        let progress = ProgressState::new();
        let err = evaluate_batch(&filter, &projector, &progress, records(8), 3).unwrap_err();
        assert!(matches!(err, FilterSpecError::NonNumericField { .. }));
    }
}
