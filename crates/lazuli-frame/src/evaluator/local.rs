use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;

use crate::config::EvaluatorConfig;
use crate::evaluator::{Evaluator, PlanHandle, SerializeFormat};
use crate::io::{CsvWriterOptions, ParquetWriterOptions, SinkOptions};
use crate::lazy::{AsofJoinArgs, JoinArgs, LogicalPlan, OptFlags, Optimizer, SinkTarget};
use crate::physical::{self, ExecOptions, Executor};
use crate::{DataFrame, DataFrameError, Expr, Result};

#[derive(Debug)]
struct PlanSlot {
    plan: Arc<LogicalPlan>,
    /// Set by `optimization_toggle`; `None` evaluates with the default flags.
    flags: Option<OptFlags>,
}

#[derive(Debug)]
struct Entry {
    generation: u32,
    slot: Option<PlanSlot>,
}

/// Slot storage with a free list; released indices are reused under a new
/// generation.
#[derive(Debug, Default)]
struct Arena {
    entries: Vec<Entry>,
    free: Vec<usize>,
    live: usize,
}

impl Arena {
    fn insert(&mut self, slot: PlanSlot) -> PlanHandle {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let entry = &mut self.entries[index];
            entry.slot = Some(slot);
            return PlanHandle::new(index, entry.generation);
        }
        self.entries.push(Entry {
            generation: 0,
            slot: Some(slot),
        });
        PlanHandle::new(self.entries.len() - 1, 0)
    }

    fn get(&self, handle: PlanHandle) -> Option<&PlanSlot> {
        self.entries
            .get(handle.index())
            .filter(|entry| entry.generation == handle.generation())
            .and_then(|entry| entry.slot.as_ref())
    }

    fn remove(&mut self, handle: PlanHandle) -> bool {
        let Some(entry) = self.entries.get_mut(handle.index()) else {
            return false;
        };
        if entry.generation != handle.generation() || entry.slot.take().is_none() {
            return false;
        }
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(handle.index());
        self.live -= 1;
        true
    }
}

/// In-process evaluator: an arena of plans executed over Arrow record batches.
///
/// Slots live until their handle is released, which [`crate::LazyFrame`]
/// does when its last clone is dropped.
#[derive(Debug)]
pub struct LocalEvaluator {
    config: EvaluatorConfig,
    slots: RwLock<Arena>,
}

impl Default for LocalEvaluator {
    fn default() -> Self {
        Self::new(EvaluatorConfig::default())
    }
}

impl LocalEvaluator {
    /// Create an empty evaluator.
    pub fn new(config: EvaluatorConfig) -> Self {
        Self {
            config,
            slots: RwLock::new(Arena::default()),
        }
    }

    /// Configuration this evaluator runs with.
    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    /// Number of plans currently held.
    pub fn plan_count(&self) -> usize {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .live
    }

    fn push(&self, slot: PlanSlot) -> PlanHandle {
        tracing::debug!(node = slot.plan.name(), "register plan");
        self.slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(slot)
    }

    fn slot(&self, handle: PlanHandle) -> Result<(Arc<LogicalPlan>, OptFlags)> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        let slot = slots
            .get(handle)
            .ok_or(DataFrameError::InvalidPlanHandle {
                handle: handle.index(),
            })?;
        Ok((Arc::clone(&slot.plan), slot.flags.unwrap_or_default()))
    }

    fn exec_options(&self, flags: &OptFlags) -> ExecOptions {
        ExecOptions {
            type_coercion: flags.type_coercion,
            comm_subexpr_elim: flags.comm_subexpr_elim,
            csv_infer_schema_length: self.config.csv_infer_schema_length,
            parquet_batch_size: self.config.parquet_batch_size,
        }
    }

    fn run(&self, handle: PlanHandle, fetch: Option<usize>) -> Result<RecordBatch> {
        let (plan, flags) = self.slot(handle)?;
        let optimized = Optimizer::optimize(&plan, &flags);
        if self.config.log_plans {
            tracing::debug!(
                handle = handle.index(),
                plan = %optimized.display(),
                "optimized plan"
            );
        }
        let physical = physical::compile(&optimized, fetch)?;
        Executor::new(self.exec_options(&flags)).execute(&physical)
    }

    fn evaluate(&self, op: &'static str, handle: PlanHandle, fetch: Option<usize>) -> Result<DataFrame> {
        let span = tracing::info_span!("evaluate", op, handle = handle.index());
        let _guard = span.enter();
        let started = Instant::now();
        let batch = self.run(handle, fetch)?;
        tracing::info!(
            rows = batch.num_rows(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "{op} finished"
        );
        Ok(DataFrame::from_record_batch(batch))
    }

    fn sink(
        &self,
        handle: PlanHandle,
        target: SinkTarget,
        write: impl FnOnce(&RecordBatch) -> Result<()>,
    ) -> Result<PlanHandle> {
        let span = tracing::info_span!("sink", handle = handle.index());
        let _guard = span.enter();
        let started = Instant::now();

        let (input, _) = self.slot(handle)?;
        let batch = self.run(handle, None)?;
        write(&batch)?;
        tracing::info!(
            rows = batch.num_rows(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "sink finished"
        );

        Ok(self.push(PlanSlot {
            plan: Arc::new(LogicalPlan::Sink { input, target }),
            flags: None,
        }))
    }
}

impl Evaluator for LocalEvaluator {
    fn register(&self, plan: LogicalPlan) -> PlanHandle {
        self.push(PlanSlot {
            plan: Arc::new(plan),
            flags: None,
        })
    }

    fn resolve(&self, handle: PlanHandle) -> Result<Arc<LogicalPlan>> {
        Ok(self.slot(handle)?.0)
    }

    fn join(
        &self,
        left: PlanHandle,
        right: PlanHandle,
        left_on: Vec<Expr>,
        right_on: Vec<Expr>,
        args: JoinArgs,
    ) -> Result<PlanHandle> {
        let left = self.resolve(left)?;
        let right = self.resolve(right)?;
        Ok(self.register(LogicalPlan::Join {
            left,
            right,
            left_on,
            right_on,
            args,
        }))
    }

    fn join_asof(
        &self,
        left: PlanHandle,
        right: PlanHandle,
        left_on: Expr,
        right_on: Expr,
        by_left: Vec<String>,
        by_right: Vec<String>,
        args: AsofJoinArgs,
    ) -> Result<PlanHandle> {
        let left = self.resolve(left)?;
        let right = self.resolve(right)?;
        Ok(self.register(LogicalPlan::AsofJoin {
            left,
            right,
            left_on,
            right_on,
            by_left,
            by_right,
            args,
        }))
    }

    fn optimization_toggle(&self, handle: PlanHandle, flags: OptFlags) -> Result<PlanHandle> {
        let plan = self.resolve(handle)?;
        Ok(self.push(PlanSlot {
            plan,
            flags: Some(flags),
        }))
    }

    fn release(&self, handle: PlanHandle) {
        let released = self
            .slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(handle);
        if released {
            tracing::trace!(handle = handle.index(), "release plan");
        }
    }

    fn collect(&self, handle: PlanHandle) -> Result<DataFrame> {
        self.evaluate("collect", handle, None)
    }

    fn fetch(&self, handle: PlanHandle, n_rows: usize) -> Result<DataFrame> {
        self.evaluate("fetch", handle, Some(n_rows))
    }

    fn sink_csv(
        &self,
        handle: PlanHandle,
        path: &Path,
        options: &CsvWriterOptions,
        sink: &SinkOptions,
    ) -> Result<PlanHandle> {
        let target = SinkTarget::Csv {
            path: path.to_path_buf(),
            options: options.clone(),
            sink: sink.clone(),
        };
        let batch_size = self.config.sink_batch_size;
        self.sink(handle, target, |batch| {
            physical::write_csv_sink(batch, path, options, sink, batch_size)
        })
    }

    fn sink_parquet(
        &self,
        handle: PlanHandle,
        path: &Path,
        options: &ParquetWriterOptions,
        sink: &SinkOptions,
    ) -> Result<PlanHandle> {
        let target = SinkTarget::Parquet {
            path: path.to_path_buf(),
            options: options.clone(),
            sink: sink.clone(),
        };
        let batch_size = self.config.sink_batch_size;
        self.sink(handle, target, |batch| {
            physical::write_parquet_sink(batch, path, options, sink, batch_size)
        })
    }

    fn describe_plan(&self, handle: PlanHandle) -> Result<String> {
        Ok(self.resolve(handle)?.display())
    }

    fn describe_optimized_plan(&self, handle: PlanHandle) -> Result<String> {
        let (plan, flags) = self.slot(handle)?;
        Ok(Optimizer::optimize(&plan, &flags).display())
    }

    fn schema(&self, handle: PlanHandle) -> Result<SchemaRef> {
        Ok(self.run(handle, Some(0))?.schema())
    }

    fn serialize(&self, handle: PlanHandle, format: SerializeFormat) -> Result<Vec<u8>> {
        let plan = self.resolve(handle)?;
        let bytes = match format {
            SerializeFormat::Json => serde_json::to_vec(plan.as_ref())
                .map_err(|err| DataFrameError::serialization(format.as_str(), err.to_string()))?,
            SerializeFormat::Bincode => bincode::serialize(plan.as_ref())
                .map_err(|err| DataFrameError::serialization(format.as_str(), err.to_string()))?,
        };
        Ok(bytes)
    }

    fn deserialize(&self, bytes: &[u8], format: SerializeFormat) -> Result<PlanHandle> {
        let plan: LogicalPlan = match format {
            SerializeFormat::Json => serde_json::from_slice(bytes)
                .map_err(|err| DataFrameError::serialization(format.as_str(), err.to_string()))?,
            SerializeFormat::Bincode => bincode::deserialize(bytes)
                .map_err(|err| DataFrameError::serialization(format.as_str(), err.to_string()))?,
        };
        Ok(self.register(plan))
    }
}
