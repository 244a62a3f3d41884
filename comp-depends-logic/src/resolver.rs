use crate::{
    error::{MaterializeError, StoreError},
    metrics,
    storage::{ComputationCatalog, DependencyIndex, TimeSeriesCatalog},
    template,
    types::{
        AppId, CompId, DbComputation, GroupId, ParmDirection, TimeSeriesIdentifier, TsKey,
    },
};
use async_trait::async_trait;
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};
use tracing::instrument;

/// A time series with new data and the records that carried it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggeringTimeSeries {
    pub tsid: TimeSeriesIdentifier,
    pub record_nums: BTreeSet<i64>,
}

impl TriggeringTimeSeries {
    pub fn new(tsid: TimeSeriesIdentifier) -> Self {
        Self {
            tsid,
            record_nums: BTreeSet::new(),
        }
    }

    pub fn with_record(mut self, record_num: i64) -> Self {
        self.record_nums.insert(record_num);
        self
    }
}

/// Groups `(time series, record number)` pairs by time series.
pub fn collect_triggers(
    records: impl IntoIterator<Item = (TimeSeriesIdentifier, i64)>,
) -> Vec<TriggeringTimeSeries> {
    let mut by_key: BTreeMap<TsKey, TriggeringTimeSeries> = BTreeMap::new();
    for (tsid, record_num) in records {
        by_key
            .entry(tsid.key)
            .or_insert_with(|| TriggeringTimeSeries::new(tsid))
            .record_nums
            .insert(record_num);
    }
    by_key.into_values().collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundParm {
    pub role_name: String,
    pub direction: ParmDirection,
    pub unique_string: Option<String>,
    pub ts_key: Option<TsKey>,
}

impl BoundParm {
    fn same_binding(&self, other: &BoundParm) -> bool {
        match (&self.unique_string, &other.unique_string) {
            (None, None) => true,
            (Some(left), Some(right)) => left.eq_ignore_ascii_case(right),
            _ => false,
        }
    }
}

/// A computation ready to hand to the executor, with every parm bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutableComputation {
    pub comp_id: CompId,
    pub name: String,
    pub algorithm: String,
    pub group_id: Option<GroupId>,
    pub parms: Vec<BoundParm>,
    pub trigger_records: BTreeSet<i64>,
}

impl ExecutableComputation {
    fn from_concrete(comp: &DbComputation) -> Self {
        let parms = comp
            .parms
            .iter()
            .map(|parm| BoundParm {
                role_name: parm.role_name.clone(),
                direction: parm.direction,
                unique_string: parm.binding.concrete_unique_string().map(str::to_string),
                ts_key: parm.binding.concrete_key(),
            })
            .collect();
        Self {
            comp_id: comp.id,
            name: comp.name.clone(),
            algorithm: comp.algorithm.clone(),
            group_id: comp.group_id,
            parms,
            trigger_records: BTreeSet::new(),
        }
    }

    pub fn inputs(&self) -> impl Iterator<Item = &BoundParm> {
        self.parms
            .iter()
            .filter(|parm| parm.direction == ParmDirection::Input)
    }

    pub fn has_input(&self, key: TsKey) -> bool {
        self.inputs().any(|parm| parm.ts_key == Some(key))
    }

    /// Same computation with the same concrete identity for every input.
    pub fn is_same_clone(&self, other: &ExecutableComputation) -> bool {
        if self.comp_id != other.comp_id {
            return false;
        }
        let mine: Vec<_> = self.inputs().collect();
        let theirs: Vec<_> = other.inputs().collect();
        mine.len() == theirs.len()
            && mine
                .iter()
                .zip(theirs.iter())
                .all(|(left, right)| left.same_binding(right))
    }
}

/// Appends `exec` to `result`, or merges its trigger records into an equal
/// entry already there.
fn add_or_merge(result: &mut Vec<ExecutableComputation>, exec: ExecutableComputation) {
    match result.iter_mut().find(|existing| existing.is_same_clone(&exec)) {
        Some(existing) => existing.trigger_records.extend(exec.trigger_records),
        None => result.push(exec),
    }
}

/// Finds the computations to run for a batch of changed time series.
pub struct Resolver {
    depends: Arc<dyn DependencyIndex>,
    comps: Arc<dyn ComputationCatalog>,
    tsids: Arc<dyn TimeSeriesCatalog>,
    app_id: Option<AppId>,
}

impl Resolver {
    pub fn new(
        depends: Arc<dyn DependencyIndex>,
        comps: Arc<dyn ComputationCatalog>,
        tsids: Arc<dyn TimeSeriesCatalog>,
    ) -> Self {
        Self {
            depends,
            comps,
            tsids,
            app_id: None,
        }
    }

    /// Only resolve computations of one loading application.
    pub fn with_app(mut self, app_id: AppId) -> Self {
        self.app_id = Some(app_id);
        self
    }

    #[instrument(skip_all, fields(batch_size = batch.len()))]
    pub async fn resolve(
        &self,
        batch: &[TriggeringTimeSeries],
    ) -> Result<Vec<ExecutableComputation>, StoreError> {
        let mut result = Vec::new();
        for trigger in batch {
            for comp_id in self.depends.comp_ids_for(trigger.tsid.key).await? {
                let Some(comp) = self.comps.get_by_id(comp_id).await? else {
                    tracing::warn!(
                        comp_id = %comp_id,
                        ts_key = %trigger.tsid.key,
                        "dependent computation no longer exists"
                    );
                    continue;
                };
                if !comp.enabled {
                    tracing::debug!(comp_id = %comp_id, "skipping disabled computation");
                    continue;
                }
                if self.app_id.is_some() && comp.app_id != self.app_id {
                    continue;
                }

                if !comp.is_group() {
                    let mut exec = ExecutableComputation::from_concrete(&comp);
                    exec.trigger_records = trigger.record_nums.clone();
                    add_or_merge(&mut result, exec);
                    continue;
                }

                match self.materialize(&comp, &trigger.tsid).await {
                    Ok(materialized) => {
                        for mut exec in materialized {
                            exec.trigger_records = trigger.record_nums.clone();
                            add_or_merge(&mut result, exec);
                        }
                    }
                    Err(MaterializeError::Store(err)) => return Err(err),
                    Err(err) => {
                        tracing::warn!(
                            comp_id = %comp.id,
                            comp_name = %comp.name,
                            ts_key = %trigger.tsid.key,
                            error = %err,
                            "cannot materialize group computation, skipping"
                        );
                    }
                }
            }
        }
        tracing::debug!(computations = result.len(), "batch resolved");
        Ok(result)
    }

    /// Binds a group computation against `trigger`. When the direct binding
    /// does not reach `trigger`, every other time series known to trigger the
    /// computation is tried and kept if its binding includes `trigger`.
    pub async fn materialize(
        &self,
        comp: &DbComputation,
        trigger: &TimeSeriesIdentifier,
    ) -> Result<Vec<ExecutableComputation>, MaterializeError> {
        let direct_err = match self.concretize(comp, trigger).await {
            Ok(exec) if exec.has_input(trigger.key) => return Ok(vec![exec]),
            Ok(_) => MaterializeError::TriggerNotInput,
            Err(MaterializeError::Store(err)) => return Err(err.into()),
            Err(err) => err,
        };
        tracing::debug!(
            comp_id = %comp.id,
            ts_key = %trigger.key,
            error = %direct_err,
            "direct binding failed, searching other triggers"
        );

        let mut result = Vec::new();
        for candidate_key in self.depends.triggers_for(comp.id).await? {
            if candidate_key == trigger.key {
                continue;
            }
            let Some(candidate) = self.tsids.get_by_key(candidate_key).await? else {
                continue;
            };
            match self.concretize(comp, &candidate).await {
                Ok(exec) if exec.has_input(trigger.key) => add_or_merge(&mut result, exec),
                Ok(_) => {}
                Err(MaterializeError::Store(err)) => return Err(err.into()),
                Err(_) => {}
            }
        }

        if result.is_empty() {
            Err(direct_err)
        } else {
            Ok(result)
        }
    }

    async fn concretize(
        &self,
        comp: &DbComputation,
        from: &TimeSeriesIdentifier,
    ) -> Result<ExecutableComputation, MaterializeError> {
        let mut parms = Vec::with_capacity(comp.parms.len());
        for parm in &comp.parms {
            let unique_string = template::bind_unique_string(parm, from)
                .ok_or_else(|| MaterializeError::UnboundPart(parm.role_name.clone()))?;
            let existing = self.tsids.get_by_unique_string(&unique_string).await?;
            if parm.is_input() && existing.is_none() {
                return Err(MaterializeError::MissingInput {
                    role: parm.role_name.clone(),
                    unique_string,
                });
            }
            parms.push(BoundParm {
                role_name: parm.role_name.clone(),
                direction: parm.direction,
                ts_key: existing.map(|tsid| tsid.key),
                unique_string: Some(unique_string),
            });
        }
        Ok(ExecutableComputation {
            comp_id: comp.id,
            name: comp.name.clone(),
            algorithm: comp.algorithm.clone(),
            group_id: comp.group_id,
            parms,
            trigger_records: BTreeSet::new(),
        })
    }
}

/// Runs resolved computations. Implementations must be idempotent.
#[async_trait]
pub trait ComputationExecutor: Send + Sync {
    async fn execute(&self, comp: &ExecutableComputation) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub executed: usize,
    /// Records of every computation the executor failed on.
    pub failed_records: BTreeSet<i64>,
}

/// Resolves `batch` and hands each computation to `executor`.
pub async fn run_cycle(
    resolver: &Resolver,
    executor: &dyn ComputationExecutor,
    batch: &[TriggeringTimeSeries],
) -> Result<CycleReport, StoreError> {
    let mut report = CycleReport::default();
    for exec in resolver.resolve(batch).await? {
        match executor.execute(&exec).await {
            Ok(()) => {
                metrics::COMPUTATIONS_EXECUTED
                    .with_label_values(&["success"])
                    .inc();
                report.executed += 1;
            }
            Err(err) => {
                metrics::COMPUTATIONS_EXECUTED
                    .with_label_values(&["failure"])
                    .inc();
                tracing::warn!(
                    comp_id = %exec.comp_id,
                    comp_name = %exec.name,
                    error = ?err,
                    "computation failed"
                );
                report.failed_records.extend(exec.trigger_records.iter().copied());
            }
        }
    }
    Ok(report)
}
