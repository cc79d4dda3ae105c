//! Producer worker: batch building and the per-producer error policy.

use std::sync::Arc;

use tracing::{debug, warn};

use super::budget::Budget;
use super::dispatch::WeightedGate;
use super::governor::RateGovernor;
use super::writer::WriteJob;
use super::ShutdownState;
use crate::format::{Format, VecSource};
use crate::mapping::MappingChain;
use crate::model::Model;

/// Consecutive `Model::next` failures tolerated before a producer retires.
pub const MAX_CONSECUTIVE_MODEL_ERRORS: u32 = 100;
/// Consecutive format failures tolerated before a producer retires.
pub const MAX_CONSECUTIVE_FORMAT_ERRORS: u32 = 100;

/// Everything one producer worker owns.
pub(crate) struct ProducerContext {
    pub id: usize,
    pub label: String,
    pub model: Box<dyn Model>,
    pub chain: MappingChain,
    pub format: Box<dyn Format>,
    pub batch_size: u64,
    pub budget: Arc<Budget>,
    pub gate: Arc<WeightedGate>,
    pub governor: Option<Arc<RateGovernor>>,
    pub shutdown: Arc<ShutdownState>,
    pub sender: kanal::Sender<WriteJob>,
}

/// How a producer worker ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProducerOutcome {
    /// Budget exhausted or shutdown: the normal ways out.
    Finished,
    /// Too many consecutive errors; the producer gave up early.
    Retired,
}

/// Log the first occurrence and then every hundredth.
fn rate_limited(count: u32) -> bool {
    count == 1 || count % 100 == 0
}

/// Run one producer worker to completion.
pub(crate) fn run(mut ctx: ProducerContext) -> ProducerOutcome {
    let mut model_errors = 0u32;
    let mut mapping_errors = 0u32;
    let mut format_errors = 0u32;
    let mut outcome = ProducerOutcome::Finished;

    'batches: loop {
        if ctx.shutdown.triggered() {
            break;
        }
        if !ctx.gate.acquire(ctx.id, ctx.batch_size) {
            break;
        }

        let granted = ctx.budget.reserve(ctx.batch_size);
        if granted == 0 {
            ctx.gate.adjust(ctx.id, -(ctx.batch_size as f64));
            break;
        }
        if granted < ctx.batch_size {
            ctx.gate.adjust(ctx.id, -((ctx.batch_size - granted) as f64));
        }

        if let Some(governor) = &ctx.governor {
            if !governor.acquire(granted, &ctx.shutdown) {
                ctx.budget.refund(granted);
                ctx.gate.adjust(ctx.id, -(granted as f64));
                break;
            }
        }

        // One reservation slot per raw record; mapped-away records and
        // production errors give their slots back below.
        let mut survivors = Vec::with_capacity(granted as usize);
        for _ in 0..granted {
            match ctx.model.next() {
                Ok(record) => {
                    model_errors = 0;
                    match ctx.chain.apply(record) {
                        Ok(Some(mapped)) => {
                            mapping_errors = 0;
                            survivors.push(mapped);
                        }
                        Ok(None) => {}
                        Err(err) => {
                            mapping_errors += 1;
                            if rate_limited(mapping_errors) {
                                warn!(
                                    producer = ctx.label.as_str(),
                                    consecutive = mapping_errors,
                                    error = %err,
                                    "mapping failed; record dropped"
                                );
                            }
                            if mapping_errors >= MAX_CONSECUTIVE_MODEL_ERRORS {
                                outcome = ProducerOutcome::Retired;
                            }
                        }
                    }
                }
                Err(err) => {
                    model_errors += 1;
                    if rate_limited(model_errors) {
                        warn!(
                            producer = ctx.label.as_str(),
                            consecutive = model_errors,
                            error = %err,
                            "model production failed; record dropped"
                        );
                    }
                    if model_errors >= MAX_CONSECUTIVE_MODEL_ERRORS {
                        outcome = ProducerOutcome::Retired;
                    }
                }
            }
            if outcome == ProducerOutcome::Retired {
                break;
            }
        }

        let shipped = survivors.len() as u64;
        if shipped < granted {
            ctx.budget.refund(granted - shipped);
            ctx.gate.adjust(ctx.id, -((granted - shipped) as f64));
        }

        if shipped > 0 {
            let mut source = VecSource::new(survivors);
            match ctx.format.batch(&mut source, shipped as usize) {
                Ok(payload) => {
                    format_errors = 0;
                    if ctx.sender.send(WriteJob { payload, size: shipped }).is_err() {
                        // Writer pool is gone; nothing can be delivered.
                        ctx.budget.refund(shipped);
                        ctx.gate.adjust(ctx.id, -(shipped as f64));
                        break 'batches;
                    }
                }
                Err(err) => {
                    // The batch is dropped, never retried.
                    format_errors += 1;
                    ctx.budget.refund(shipped);
                    ctx.gate.adjust(ctx.id, -(shipped as f64));
                    if rate_limited(format_errors) {
                        warn!(
                            producer = ctx.label.as_str(),
                            consecutive = format_errors,
                            error = %err,
                            "format failed; batch dropped"
                        );
                    }
                    if format_errors >= MAX_CONSECUTIVE_FORMAT_ERRORS {
                        outcome = ProducerOutcome::Retired;
                    }
                }
            }
        }

        if outcome == ProducerOutcome::Retired {
            warn!(producer = ctx.label.as_str(), "producer retired after repeated errors");
            break;
        }
    }

    ctx.gate.retire(ctx.id);
    debug!(producer = ctx.label.as_str(), ?outcome, "producer exiting");
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use crate::format::lines::JsonLinesFormat;
    use crate::format::FieldFilter;
    use crate::record::Record;
    use crate::scheduler::test_support::shutdown_for;

    struct CountingModel {
        produced: u64,
    }

    impl Model for CountingModel {
        fn next(&mut self) -> Result<Record> {
            self.produced += 1;
            let mut record = Record::new();
            record.insert("n", self.produced);
            Ok(record)
        }
    }

    struct FailingModel;

    impl Model for FailingModel {
        fn next(&mut self) -> Result<Record> {
            Err(Error::ModelProduction("boom".to_string()))
        }
    }

    fn context(
        model: Box<dyn Model>,
        chain: MappingChain,
        number: Option<u64>,
        batch_size: u64,
    ) -> (ProducerContext, Arc<Budget>, kanal::Receiver<WriteJob>) {
        let budget = Arc::new(Budget::new(number));
        let gate = Arc::new(WeightedGate::new(&[1.0]));
        let shutdown = shutdown_for(Arc::clone(&budget), Arc::clone(&gate));
        let (sender, receiver) = kanal::bounded(64);
        let ctx = ProducerContext {
            id: 0,
            label: "test#0".to_string(),
            model,
            chain,
            format: Box::new(JsonLinesFormat::new(FieldFilter::default())),
            batch_size,
            budget: Arc::clone(&budget),
            gate,
            governor: None,
            shutdown,
            sender,
        };
        (ctx, budget, receiver)
    }

    /// Commit every arriving batch on a side thread; the producer's final
    /// reserve blocks until the last in-flight batch is committed.
    fn run_with_committer(
        ctx: ProducerContext,
        budget: Arc<Budget>,
        receiver: kanal::Receiver<WriteJob>,
    ) -> (ProducerOutcome, u64, String) {
        let committer = std::thread::spawn(move || {
            let mut total = 0;
            let mut text = String::new();
            while let Ok(job) = receiver.recv() {
                budget.commit(job.size);
                total += job.size;
                text.push_str(job.payload.as_text().unwrap());
            }
            (total, text)
        });
        let outcome = run(ctx);
        let (total, text) = committer.join().unwrap();
        (outcome, total, text)
    }

    #[test]
    fn test_produces_exactly_number_records() {
        let (ctx, budget, receiver) = context(
            Box::new(CountingModel { produced: 0 }),
            MappingChain::new(),
            Some(10),
            4,
        );
        let (outcome, total, text) = run_with_committer(ctx, Arc::clone(&budget), receiver);
        assert_eq!(outcome, ProducerOutcome::Finished);
        assert_eq!(total, 10);
        assert_eq!(text.lines().count(), 10);
        assert_eq!(budget.emitted(), 10);
    }

    #[test]
    fn test_final_batch_clipped_to_budget() {
        let (ctx, budget, receiver) = context(
            Box::new(CountingModel { produced: 0 }),
            MappingChain::new(),
            Some(1),
            100,
        );
        let (_, total, text) = run_with_committer(ctx, budget, receiver);
        assert_eq!(total, 1);
        assert_eq!(text.lines().count(), 1);
    }

    #[test]
    fn test_dropping_chain_still_fills_number() {
        let program = crate::mapping::inline::InlineMapping::parse("t", "drop-every 2").unwrap();
        let (ctx, budget, receiver) = context(
            Box::new(CountingModel { produced: 0 }),
            MappingChain::from_stages(vec![Box::new(program)]),
            Some(10),
            4,
        );
        let (outcome, total, _) = run_with_committer(ctx, Arc::clone(&budget), receiver);
        assert_eq!(outcome, ProducerOutcome::Finished);
        assert_eq!(total, 10);
        assert_eq!(budget.emitted(), 10);
    }

    #[test]
    fn test_failing_model_retires_producer() {
        let (ctx, budget, _receiver) = context(
            Box::new(FailingModel),
            MappingChain::new(),
            Some(10),
            4,
        );
        let outcome = run(ctx);
        assert_eq!(outcome, ProducerOutcome::Retired);
        assert_eq!(budget.emitted(), 0);
    }
}
