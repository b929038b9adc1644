//! Live-unit collection, owned by the processing thread
//!
//! Units are kept in a `Vec` sorted by id with its full capacity reserved up
//! front, so inserting and removing never allocates. Removal is two-phase:
//!
//! ```text
//!  Destroy(id) ──► Stopping ──(renders one faded quantum)──► reap() ──► dropped on GC thread
//! ```
//!
//! A Stopping unit still occupies its id (a Create for the same id is a
//! duplicate) but no longer accepts commands.

use std::path::PathBuf;

use basedrop::{Owned, Shared};

use super::snapshot::UnitSummary;
use super::sync::{self, SyncPolicy};
use super::transport::{TransportState, TransportView};
use crate::error::{ApplyError, ApplyResult, LifecycleError, StateError};
use crate::preset::PresetTree;
use crate::resource::{normalized_position, ReloadOutcome, ReloadRequester};
use crate::types::{ParamName, ParamValue, StereoBuffer, UnitId, UnitState, MAX_QUANTUM_FRAMES};
use crate::unit::{PrepareContext, Unit};

struct LiveUnit {
    id: UnitId,
    state: UnitState,
    unit: Owned<Box<dyn Unit>>,
}

/// Owner of every live unit
pub struct UnitManager {
    units: Vec<LiveUnit>,
    max_units: usize,
    sample_rate: u32,
    max_frames: usize,
    reloads: ReloadRequester,
    /// Per-unit render target, summed into the output
    scratch: StereoBuffer,
}

impl UnitManager {
    pub fn new(max_units: usize, sample_rate: u32, max_frames: usize, reloads: ReloadRequester) -> Self {
        let max_frames = max_frames.min(MAX_QUANTUM_FRAMES);
        Self {
            units: Vec::with_capacity(max_units),
            max_units,
            sample_rate,
            max_frames,
            reloads,
            scratch: StereoBuffer::silence(max_frames),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    /// Units that accept commands (excludes units being destroyed)
    pub fn live_count(&self) -> usize {
        self.units
            .iter()
            .filter(|live| live.state.is_addressable())
            .count()
    }

    /// All units in the collection, including Stopping ones
    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn contains(&self, id: UnitId) -> bool {
        self.index_of(id).is_ok()
    }

    pub fn state(&self, id: UnitId) -> Option<UnitState> {
        self.index_of(id).ok().map(|index| self.units[index].state)
    }

    pub fn get(&self, id: UnitId) -> Option<&dyn Unit> {
        let index = self.index_of(id).ok()?;
        Some(&**self.units[index].unit)
    }

    pub fn get_mut(&mut self, id: UnitId) -> Option<&mut dyn Unit> {
        let index = self.index_of(id).ok()?;
        Some(&mut **self.units[index].unit)
    }

    pub fn ids(&self) -> impl Iterator<Item = UnitId> + '_ {
        self.units.iter().map(|live| live.id)
    }

    fn index_of(&self, id: UnitId) -> Result<usize, usize> {
        self.units.binary_search_by_key(&id, |live| live.id)
    }

    /// Index of a unit that may receive commands
    fn addressable(&self, id: UnitId) -> ApplyResult<usize> {
        let index = self
            .index_of(id)
            .map_err(|_| LifecycleError::UnknownId(id))?;
        if !self.units[index].state.is_addressable() {
            return Err(StateError(id).into());
        }
        Ok(index)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Commands
    // ─────────────────────────────────────────────────────────────────────────

    /// Prepare and insert a unit built on a producer thread
    ///
    /// On failure the unit is dropped, which defers its memory to the
    /// collector thread.
    pub fn create(
        &mut self,
        id: UnitId,
        mut unit: Owned<Box<dyn Unit>>,
        transport: &TransportView,
    ) -> Result<(), LifecycleError> {
        let index = match self.index_of(id) {
            Ok(_) => return Err(LifecycleError::DuplicateId(id)),
            Err(index) => index,
        };
        if self.units.len() >= self.max_units {
            return Err(LifecycleError::CapacityExceeded(self.max_units));
        }

        unit.prepare(&mut PrepareContext {
            id,
            sample_rate: self.sample_rate,
            max_frames: self.max_frames,
            transport: *transport,
            reloads: &mut self.reloads,
        });
        if let Some(synced) = unit.as_synced() {
            sync::adopt(synced, transport);
        }

        log::info!("Unit {} created ({})", id, unit.type_name());
        self.units.insert(
            index,
            LiveUnit {
                id,
                state: follow_transport(transport.state),
                unit,
            },
        );
        Ok(())
    }

    /// Mark a unit for removal at the end of the current quantum
    pub fn destroy(&mut self, id: UnitId) -> ApplyResult<()> {
        let index = self.addressable(id)?;
        self.units[index].state = UnitState::Stopping;
        Ok(())
    }

    pub fn update(&mut self, id: UnitId, param: &ParamName, value: ParamValue) -> ApplyResult<()> {
        let index = self.addressable(id)?;
        if self.units[index].unit.handle_param(param, value) {
            Ok(())
        } else {
            Err(LifecycleError::UnknownParam { id, param: *param }.into())
        }
    }

    /// Apply a whole configuration tree; on error nothing changes
    pub fn load_preset(&mut self, id: UnitId, preset: &PresetTree) -> ApplyResult<()> {
        let index = self.addressable(id)?;
        self.units[index]
            .unit
            .apply_preset(preset)
            .map_err(|source| ApplyError::Preset { id, source })
    }

    /// Queue a reload for a unit; returns the request generation
    pub fn reload(&mut self, id: UnitId, path: Shared<PathBuf>) -> ApplyResult<u64> {
        let index = self.addressable(id)?;
        let generation = self.units[index]
            .unit
            .request_reload(id, path, &mut self.reloads)?;
        Ok(generation)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Per-quantum steps
    // ─────────────────────────────────────────────────────────────────────────

    /// Fold completed reloads into their units; returns how many resolved
    pub fn poll_resources(&mut self) -> usize {
        let mut resolved = 0;
        for live in self.units.iter_mut() {
            if let Some(outcome) = live.unit.poll_resource(live.id) {
                resolved += 1;
                if let ReloadOutcome::Failed { generation } = outcome {
                    log::debug!("Unit {}: reload {} failed", live.id, generation);
                }
            }
        }
        resolved
    }

    /// Move addressable units to the state implied by the transport
    pub fn update_states(&mut self, transport: &TransportView) {
        let state = follow_transport(transport.state);
        for live in self.units.iter_mut() {
            if live.state.is_addressable() {
                live.state = state;
            }
        }
    }

    /// Run sync handling for every unit; returns total pulses consumed
    pub fn sync_all(&mut self, transport: &TransportView) -> u64 {
        let mut pulses = 0;
        for live in self.units.iter_mut() {
            if let Some(synced) = live.unit.as_synced() {
                pulses += sync::drive(synced, transport);
            }
        }
        pulses
    }

    /// Render every unit and sum into `out`
    ///
    /// Stopping units render one last quantum with a linear fade to silence.
    /// Frames of `out` beyond the scratch capacity are left untouched.
    pub fn render(&mut self, out: &mut StereoBuffer, transport: &TransportView) {
        let frames = out.len().min(self.max_frames);
        self.scratch.set_len_from_capacity(frames);

        for live in self.units.iter_mut() {
            self.scratch.fill_silence();
            live.unit.render(&mut self.scratch, transport);

            if live.state == UnitState::Stopping {
                let step = 1.0 / frames.max(1) as f32;
                for (i, sample) in self.scratch.iter_mut().enumerate() {
                    *sample *= 1.0 - step * (i + 1) as f32;
                }
            }
            for (dst, src) in out.iter_mut().zip(self.scratch.iter()) {
                *dst += *src;
            }
        }
    }

    /// Remove units destroyed during this quantum; returns how many
    pub fn reap(&mut self) -> usize {
        let before = self.units.len();
        for live in self.units.iter_mut() {
            if live.state == UnitState::Stopping {
                live.unit.teardown();
                live.state = UnitState::Destroyed;
                log::info!("Unit {} destroyed", live.id);
            }
        }
        // Dropping an Owned only queues it for the collector thread
        self.units.retain(|live| live.state != UnitState::Destroyed);
        before - self.units.len()
    }

    /// Fill `out` with a summary of every unit, without growing it
    pub fn summaries(&mut self, out: &mut Vec<UnitSummary>) {
        out.clear();
        for live in self.units.iter_mut() {
            if out.len() == out.capacity() {
                break;
            }
            let sync = live
                .unit
                .as_synced()
                .map(|synced| synced.sync_policy())
                .unwrap_or(SyncPolicy::Exempt);
            let slot = live.unit.resource_slot();
            let resource_frames = slot.and_then(|slot| slot.length_frames());
            let reload_pending = slot.and_then(|slot| slot.pending());
            let playhead = live.unit.playhead();
            out.push(UnitSummary {
                id: live.id.get(),
                type_name: live.unit.type_name(),
                state: live.state,
                sync,
                resource_frames,
                playhead,
                normalized_position: match (playhead, resource_frames) {
                    (Some(pos), Some(len)) => normalized_position(pos, len),
                    _ => None,
                },
                reload_pending,
            });
        }
    }
}

/// Unit state for a given transport state
fn follow_transport(state: TransportState) -> UnitState {
    match state {
        TransportState::Playing => UnitState::Playing,
        TransportState::Paused => UnitState::Paused,
        TransportState::Stopped => UnitState::Prepared,
    }
}
