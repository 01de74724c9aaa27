use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clipping::{ClipPrimitive, OffsetPrimitive};
use crate::config::AlgebraConfig;
use crate::error::{AlgebraError, Error, RegistryError, Result};
use crate::operations::{Expression, Materialize, Pipeline, StoreSource};
use crate::structure::{Contour, RoiNumber, Rgb, StructureStore};

use super::flight::{FlightTable, RegenerationState};
use super::graph::DependencyGraph;
use super::store::{CleanupReport, SuperstructureStore};
use super::{NewSuperstructure, Superstructure, SuperstructureId};

/// How a derived structure is computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Definition {
    /// An infix expression such as `PTV = margin(CTV, 5) - Rectum`.
    Expression(String),
    /// Explicit steps; stored as the equivalent expression.
    Pipeline(Pipeline),
}

/// Where the derived contours are written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetSpec {
    /// Existing structure to overwrite. When absent, a structure with the
    /// target name is reused, or a new one is created.
    #[serde(default)]
    pub roi_number: Option<RoiNumber>,
    /// Name of the target; defaults to the expression's `label =`.
    #[serde(default)]
    pub name: Option<String>,
    pub color: Rgb,
}

/// A request to derive a structure and register it for regeneration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSuperstructure {
    pub definition: Definition,
    pub target: TargetSpec,
    pub auto_update: bool,
}

/// A newly registered superstructure and the slices it could not compute.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateOutcome {
    pub superstructure: Superstructure,
    pub skipped_slices: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RegenerationOutcome {
    /// The target's contours were replaced.
    Regenerated {
        contour_count: usize,
        skipped_slices: Vec<f64>,
    },
    /// A regeneration was already running; it will run once more instead.
    Coalesced,
    /// The superstructure was deleted while it was being regenerated; the
    /// computed contours were thrown away.
    Discarded,
    /// Regeneration failed and the target was left unchanged.
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegenerationReport {
    pub id: SuperstructureId,
    pub outcome: RegenerationOutcome,
}

/// Creates superstructures and keeps their targets in step with their
/// sources for one structure set.
pub struct RegenerationController<C> {
    structures: Arc<dyn StructureStore>,
    store: Arc<dyn SuperstructureStore>,
    clipper: C,
    config: AlgebraConfig,
    graph: RwLock<DependencyGraph>,
    flights: FlightTable,
}

impl<C> RegenerationController<C>
where
    C: ClipPrimitive + OffsetPrimitive,
{
    /// Creates a controller with an empty dependency graph; call
    /// [`RegenerationController::load`] to pick up stored records.
    pub fn new(
        structures: Arc<dyn StructureStore>,
        store: Arc<dyn SuperstructureStore>,
        clipper: C,
    ) -> Self {
        Self {
            structures,
            store,
            clipper,
            config: AlgebraConfig::default(),
            graph: RwLock::new(DependencyGraph::new()),
            flights: FlightTable::new(),
        }
    }

    /// Replaces the evaluation settings.
    #[must_use]
    pub fn with_config(mut self, config: AlgebraConfig) -> Self {
        self.config = config;
        self
    }

    /// The structure set this controller writes to.
    pub fn structures(&self) -> &dyn StructureStore {
        &*self.structures
    }

    /// Whether `id`'s target reflects its current sources.
    #[must_use]
    pub fn state(&self, id: SuperstructureId) -> RegenerationState {
        self.flights.state(id)
    }

    /// Removes orphaned records, then loads the structure set's
    /// superstructures and rebuilds the dependency graph from them.
    ///
    /// # Errors
    ///
    /// Returns an error if the superstructure store fails.
    pub fn load(&self) -> Result<Vec<Superstructure>> {
        self.cleanup_orphans()?;
        let records = self.store.list(self.structures.structure_set_id())?;
        *self.graph.write() = DependencyGraph::from_records(&records);
        info!(count = records.len(), "loaded superstructures");
        Ok(records)
    }

    /// Deletes every superstructure whose target structure no longer exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the superstructure store fails.
    pub fn cleanup_orphans(&self) -> Result<CleanupReport> {
        let set_id = self.structures.structure_set_id();
        let report = self
            .store
            .cleanup_orphans(set_id, &self.structures.roi_numbers())?;
        if report.cleaned_count > 0 {
            let records = self.store.list(set_id)?;
            *self.graph.write() = DependencyGraph::from_records(&records);
        }
        Ok(report)
    }

    /// Looks up a superstructure.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::NotFound` for an unknown id.
    pub fn get(&self, id: SuperstructureId) -> Result<Superstructure> {
        Ok(self.store.get(id)?.ok_or(RegistryError::NotFound(id))?)
    }

    /// Evaluates a definition, writes the result to the target structure and
    /// registers the superstructure.
    ///
    /// Nothing is written if parsing, name resolution, the dependency check,
    /// evaluation or persisting the record fails.
    ///
    /// # Errors
    ///
    /// Returns `AlgebraError` for a bad definition or unknown source, and
    /// `RegistryError` if the target would derive from itself, close a
    /// cycle, or is already derived by another superstructure.
    pub fn create(&self, request: CreateSuperstructure) -> Result<CreateOutcome> {
        let text = match &request.definition {
            Definition::Expression(text) => text.clone(),
            Definition::Pipeline(pipeline) => pipeline.to_expression()?,
        };
        let expression = Expression::parse(&text)?;
        let name = request
            .target
            .name
            .clone()
            .or_else(|| expression.label().map(str::to_owned))
            .ok_or_else(|| AlgebraError::malformed("target structure needs a name", 0))?;

        let mut source_names = Vec::new();
        let mut source_rois = Vec::new();
        for operand in expression.operand_names() {
            let structure = self.structures.find_by_name(operand).ok_or_else(|| {
                AlgebraError::StructureNotFound {
                    name: operand.to_owned(),
                }
            })?;
            if !source_rois.contains(&structure.roi_number) {
                source_names.push(operand.to_owned());
                source_rois.push(structure.roi_number);
            }
        }

        let planned = request
            .target
            .roi_number
            .or_else(|| self.structures.find_by_name(&name).map(|s| s.roi_number));
        if let Some(target) = planned {
            self.graph.read().check(target, &source_rois)?;
        }

        let source = StoreSource::new(&*self.structures)
            .with_aliases(source_names.iter().cloned().zip(source_rois.iter().copied()));
        let outcome = expression.evaluate(&source, &self.clipper, self.config)?;
        let contours = Materialize::new(&outcome.slices).execute();

        // Lock order everywhere: target ROI lock, then the graph.
        let record = loop {
            let target = match planned {
                Some(roi) => roi,
                None => self.structures.next_roi_number()?,
            };
            let lock = self.structures.roi_lock(target);
            let _guard = lock.lock();
            if planned.is_none() && self.structures.structure(target).is_some() {
                continue;
            }
            break self.commit(
                NewSuperstructure {
                    structure_set_id: self.structures.structure_set_id().to_owned(),
                    target_roi_number: target,
                    source_roi_numbers: source_rois,
                    source_names,
                    operation_expression: text,
                    operation_type: expression.operation_type(),
                    auto_update: request.auto_update,
                },
                &name,
                request.target.color,
                contours,
            )?;
        };
        let target = record.target_roi_number;

        info!(
            id = %record.id,
            target_roi = target,
            expression = %record.operation_expression,
            skipped = outcome.skipped.len(),
            "created superstructure"
        );
        Ok(CreateOutcome {
            superstructure: record,
            skipped_slices: outcome.skipped,
        })
    }

    /// Registers the record and writes its target. The caller holds the
    /// target's ROI lock. A failed write removes the record again.
    fn commit(
        &self,
        new: NewSuperstructure,
        name: &str,
        color: Rgb,
        contours: Vec<Contour>,
    ) -> Result<Superstructure> {
        let target = new.target_roi_number;
        let mut graph = self.graph.write();
        graph.check(target, &new.source_roi_numbers)?;
        let record = self.store.create(new)?;
        let written = graph
            .insert(&record)
            .map_err(Error::from)
            .and_then(|()| self.structures.ensure_structure(Some(target), name, color))
            .and_then(|_| self.structures.write_contours(target, contours));
        if let Err(err) = written {
            graph.remove(record.id);
            if let Err(cleanup) = self.store.delete(record.id) {
                warn!(id = %record.id, %cleanup, "could not remove record after failed create");
            }
            return Err(err);
        }
        Ok(record)
    }

    /// Recomputes a superstructure from its stored expression and replaces
    /// the target's contours.
    ///
    /// If another regeneration of the same superstructure is running, this
    /// call returns [`RegenerationOutcome::Coalesced`] at once and the running
    /// one repeats after it finishes.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::NotFound` for an unknown id,
    /// `RegistryError::TargetMissing` if the target structure is gone, and
    /// `AlgebraError` if the expression no longer evaluates. The target is
    /// unchanged on error.
    pub fn regenerate(&self, id: SuperstructureId) -> Result<RegenerationReport> {
        if self.store.get(id)?.is_none() {
            return Err(RegistryError::NotFound(id).into());
        }
        if !self.flights.begin(id) {
            debug!(%id, "regeneration already running, coalesced");
            return Ok(RegenerationReport {
                id,
                outcome: RegenerationOutcome::Coalesced,
            });
        }
        loop {
            let outcome = match self.regenerate_once(id) {
                Ok(outcome) => outcome,
                Err(err) => {
                    self.flights.abort(id);
                    warn!(%id, %err, "regeneration failed");
                    return Err(err);
                }
            };
            if !self.flights.finish(id) {
                return Ok(RegenerationReport { id, outcome });
            }
            debug!(%id, "sources changed during regeneration, running again");
        }
    }

    fn regenerate_once(&self, id: SuperstructureId) -> Result<RegenerationOutcome> {
        let Some(record) = self.store.get(id)? else {
            return Ok(RegenerationOutcome::Discarded);
        };
        let target = record.target_roi_number;
        let lock = self.structures.roi_lock(target);
        let _guard = lock.lock();
        if self.structures.structure(target).is_none() {
            return Err(RegistryError::TargetMissing(target).into());
        }

        let expression = Expression::parse(&record.operation_expression)?;
        let source = StoreSource::new(&*self.structures).with_aliases(
            record
                .source_names
                .iter()
                .cloned()
                .zip(record.source_roi_numbers.iter().copied()),
        );
        let outcome = expression.evaluate(&source, &self.clipper, self.config)?;
        let contours = Materialize::new(&outcome.slices).execute();
        let contour_count = contours.len();

        // Deletion removes the graph node first, so holding the read lock
        // across the write keeps a deleted record from being written back.
        let graph = self.graph.read();
        if !graph.contains(id) {
            info!(%id, "superstructure deleted during regeneration, result discarded");
            return Ok(RegenerationOutcome::Discarded);
        }
        self.store.mark_updated(id, SystemTime::now())?;
        if let Err(err) = self.structures.write_contours(target, contours) {
            if let Err(restore) = self.store.mark_updated(id, record.last_updated) {
                warn!(%id, %restore, "could not restore timestamp after failed write");
            }
            return Err(err);
        }
        drop(graph);

        info!(
            %id,
            target_roi = target,
            contour_count,
            skipped = outcome.skipped.len(),
            "regenerated superstructure"
        );
        Ok(RegenerationOutcome::Regenerated {
            contour_count,
            skipped_slices: outcome.skipped,
        })
    }

    /// Regenerates every auto-updating superstructure affected by a change
    /// to `roi`, sources before the structures derived from them. A failure
    /// is reported and does not stop the cascade.
    pub fn structure_modified(&self, roi: RoiNumber) -> Vec<RegenerationReport> {
        let affected = self.graph.read().affected_by(roi);
        if affected.is_empty() {
            return Vec::new();
        }
        debug!(roi, count = affected.len(), "cascading regeneration");
        for &id in &affected {
            self.flights.mark_stale(id);
        }
        affected
            .into_iter()
            .map(|id| {
                self.regenerate(id).unwrap_or_else(|err| RegenerationReport {
                    id,
                    outcome: RegenerationOutcome::Failed {
                        reason: err.to_string(),
                    },
                })
            })
            .collect()
    }

    /// Replaces a structure's contours and cascades the change.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::TargetMissing` if the structure does not exist.
    pub fn edit_structure(
        &self,
        roi: RoiNumber,
        contours: Vec<Contour>,
    ) -> Result<Vec<RegenerationReport>> {
        self.structures.replace_contours(roi, contours)?;
        Ok(self.structure_modified(roi))
    }

    /// Deletes a superstructure. The target structure and its contours stay;
    /// a regeneration in flight finishes without writing.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::NotFound` for an unknown id.
    pub fn delete(&self, id: SuperstructureId) -> Result<()> {
        self.graph.write().remove(id);
        self.store.delete(id)?;
        self.flights.forget(id);
        info!(%id, "deleted superstructure");
        Ok(())
    }

    /// Enables or disables automatic regeneration.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::NotFound` for an unknown id.
    pub fn set_auto_update(&self, id: SuperstructureId, enabled: bool) -> Result<()> {
        self.store.set_auto_update(id, enabled)?;
        self.graph.write().set_auto_update(id, enabled);
        Ok(())
    }
}
