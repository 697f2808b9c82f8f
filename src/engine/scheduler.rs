//! Per-tick execution of systems on a worker pool.
//!
//! [`SystemManager::tick`] drives one frame:
//!
//! 1. Every job query is registered with the [`GroupCache`] and all groups are
//!    refreshed against the world's partitions.
//! 2. Systems run in registration order; each runs its stages in ascending
//!    order, fully draining one stage before the next starts.
//! 3. The merged command buffer is replayed once, on the calling thread.
//!
//! ## Running a stage
//!
//! * Scratch arrays are sized to their group and component pools are bound to
//!   raw base pointers once per stage.
//! * Every job's matched partitions are cut into chunks of `chunk_size`
//!   entities.
//! * Parallelizable chunks go onto a `crossbeam-channel` queue drained by
//!   workers of a dedicated `rayon` pool. Main-thread chunks run inline on the
//!   calling thread meanwhile.
//! * The rayon scope returns once every chunk has finished.
//! * Each chunk records into its own [`CommandBuffer`]; buffers are merged in
//!   chunk order, so replay order does not depend on thread timing.
//! * Blocking chunks run afterwards, alone, on the calling thread.
//!
//! ## Safety
//!
//! Jobs of one stage never conflict on component access (see
//! [`systems`](crate::engine::systems)), each entity row belongs to exactly
//! one chunk, and no structural change happens until the tick's replay. Under
//! those conditions the raw pool pointers handed to jobs never alias a write.

use std::sync::atomic::AtomicBool;

use crossbeam_channel::unbounded;
use log::{debug, error, trace};
use parking_lot::Mutex;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::engine::commands::CommandBuffer;
use crate::engine::config::EcsConfig;
use crate::engine::entity::Entity;
use crate::engine::error::{ECSResult, RegistryError, SchedulingError};
use crate::engine::group::{Group, GroupCache, GroupID};
use crate::engine::job::{BoundJob, JobItem, JobKind, PoolBinding};
use crate::engine::manager::{EntityManager, ReplayReport};
use crate::engine::storage::RawPool;
use crate::engine::systems::{Stage, System};
use crate::engine::types::{AccessMode, SystemID, Tick};


/// Summary of one [`SystemManager::tick`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Tick number, starting at 1.
    pub tick: Tick,
    /// Stages executed across all systems.
    pub stages: usize,
    /// Chunks dispatched across all stages.
    pub chunks: usize,
    /// Outcome of the end-of-tick command replay.
    pub replay: ReplayReport,
}

/// A contiguous run of one job's entities.
struct ChunkTask<'a> {
    index: usize,
    job: usize,
    entities: &'a [Entity],
    row_offset: usize,
}

fn run_chunk(bound: &[BoundJob], task: &ChunkTask<'_>) -> CommandBuffer {
    let job = &bound[task.job];
    let mut commands = CommandBuffer::new();
    let borrows = job.borrow_states();
    for (offset, &entity) in task.entities.iter().enumerate() {
        let item = JobItem { job, entity, row: task.row_offset + offset, borrows: &borrows };
        (job.executor)(&item, &mut commands);
        borrows.iter().for_each(|state| state.set(0));
    }
    commands
}

/// Owns the systems and the worker pool that executes them.
pub struct SystemManager {
    config: EcsConfig,
    pool: ThreadPool,
    systems: Vec<System>,
    job_groups: Vec<Vec<GroupID>>,
    groups: GroupCache,
    commands: CommandBuffer,
    tick: Tick,
}

impl SystemManager {
    /// Builds the worker pool described by `config`.
    pub fn new(config: EcsConfig) -> ECSResult<Self> {
        config.validate()?;
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.worker_threads)
            .thread_name(|i| format!("ecs-worker-{i}"))
            .build()
            .map_err(|e| SchedulingError::WorkerPool(e.to_string()))?;
        debug!("system manager started with {} workers", config.worker_threads);

        Ok(Self {
            config,
            pool,
            systems: Vec::new(),
            job_groups: Vec::new(),
            groups: GroupCache::new(),
            commands: CommandBuffer::new(),
            tick: 0,
        })
    }

    /// Adds a system; systems run in the order they were added.
    pub fn add_system(&mut self, mut system: System) -> SystemID {
        system.set_max_depth(self.config.max_dependency_depth);
        let id = system.id();
        debug!("system `{}` ({} jobs) added", system.name(), system.jobs().len());
        self.systems.push(system);
        self.job_groups.push(Vec::new());
        id
    }

    /// Registered systems in execution order.
    pub fn systems(&self) -> &[System] { &self.systems }

    /// System with identifier `id`.
    pub fn system_mut(&mut self, id: SystemID) -> Option<&mut System> {
        self.systems.iter_mut().find(|system| system.id() == id)
    }

    /// Groups resolved during the last tick.
    pub fn groups(&self) -> &GroupCache { &self.groups }

    /// Number of worker threads.
    pub fn worker_threads(&self) -> usize { self.pool.current_num_threads() }

    /// Ticks executed so far.
    pub fn ticks(&self) -> Tick { self.tick }

    fn register_groups(&mut self) {
        for (system, groups) in self.systems.iter().zip(self.job_groups.iter_mut()) {
            for job in &system.jobs()[groups.len()..] {
                groups.push(self.groups.register(job.query()));
            }
        }
    }

    /// Runs every system once against `world`, then replays their deferred
    /// structural changes.
    pub fn tick(&mut self, world: &mut EntityManager) -> ECSResult<TickReport> {
        self.tick += 1;
        self.register_groups();
        self.groups.refresh(world.partitions());

        let mut report = TickReport { tick: self.tick, ..TickReport::default() };
        for index in 0..self.systems.len() {
            let stages = self.systems[index].stages().to_vec();
            for stage in &stages {
                report.chunks += self.run_stage(world, index, stage)?;
                report.stages += 1;
            }
        }

        let commands = std::mem::take(&mut self.commands);
        report.replay = world.apply_commands(commands);
        debug!(
            "tick {}: {} stages, {} chunks, {} commands applied, {} skipped",
            report.tick, report.stages, report.chunks, report.replay.applied, report.replay.failed
        );
        Ok(report)
    }

    /// Executes one stage of one system; returns the number of chunks.
    fn run_stage(&mut self, world: &mut EntityManager, system: usize, stage: &Stage) -> ECSResult<usize> {
        let Self { config, pool, systems, job_groups, groups, commands, .. } = self;
        let job_groups = &job_groups[system];
        let system = &mut systems[system];
        let (partitions, pools) = world.dispatch_parts();

        let mut raw: Vec<Option<RawPool>> = vec![None; pools.len()];
        let mut bound = Vec::with_capacity(stage.jobs.len());
        for &handle in &stage.jobs {
            let total = groups.get(job_groups[handle.index()]).map_or(0, Group::total);
            let job = &mut system.jobs_mut()[handle.index()];

            let scratch = job.scratch_mut().map(|scratch| {
                scratch.prepare(total, config.scratch_low_water);
                scratch.raw_parts()
            });

            let access = *job.access();
            let mut bindings = Vec::new();
            for component_id in access.touched().iterate_over_components() {
                let slot = raw
                    .get_mut(component_id as usize)
                    .ok_or(RegistryError::InvalidComponentId(component_id))?;
                let pool = *slot.get_or_insert_with(|| pools[component_id as usize].raw_parts());
                let mode = access.mode_of(component_id).unwrap_or(AccessMode::Read);
                bindings.push(PoolBinding { mode, pool });
            }

            bound.push(BoundJob {
                name: job.name(),
                kind: job.kind(),
                executor: job.executor(),
                bindings,
                scratch,
                reported: AtomicBool::new(false),
            });
        }

        let mut parallel = Vec::new();
        let mut main = Vec::new();
        let mut blocking = Vec::new();
        let mut next = 0;
        for (job, &handle) in stage.jobs.iter().enumerate() {
            let Some(group) = groups.get(job_groups[handle.index()]) else { continue; };
            for slice in group.slices() {
                let Some(partition) = partitions.get(slice.partition) else { continue; };
                let entities = &partition.entities()[..slice.len.min(partition.len())];
                for (n, chunk) in entities.chunks(config.chunk_size).enumerate() {
                    let task = ChunkTask {
                        index: next,
                        job,
                        entities: chunk,
                        row_offset: slice.offset + n * config.chunk_size,
                    };
                    next += 1;
                    match bound[job].kind {
                        JobKind::Parallelizable => parallel.push(task),
                        JobKind::MainThreadOnly => main.push(task),
                        JobKind::Blocking => blocking.push(task),
                    }
                }
            }
        }
        trace!(
            "stage {}: {} parallel, {} main-thread, {} blocking chunks",
            stage.index, parallel.len(), main.len(), blocking.len()
        );

        let buffers = Mutex::new(Vec::with_capacity(next));
        if !parallel.is_empty() || !main.is_empty() {
            let workers = pool.current_num_threads().min(parallel.len());
            let (sender, receiver) = unbounded();
            for task in parallel {
                if let Err(e) = sender.send(task) {
                    error!("stage {}: chunk {} not queued: {e}", stage.index, e.0.index);
                }
            }
            drop(sender);

            let (bound, buffers) = (&bound, &buffers);
            pool.in_place_scope(|scope| {
                for _ in 0..workers {
                    let receiver = receiver.clone();
                    scope.spawn(move |_| {
                        let local: Vec<_> = receiver
                            .iter()
                            .map(|task| (task.index, run_chunk(bound, &task)))
                            .collect();
                        buffers.lock().extend(local);
                    });
                }

                let local: Vec<_> = main.iter().map(|task| (task.index, run_chunk(bound, task))).collect();
                buffers.lock().extend(local);
            });
        }

        let mut merged = buffers.into_inner();
        merged.sort_unstable_by_key(|(index, _)| *index);
        for (_, buffer) in merged {
            commands.append(buffer);
        }

        for task in &blocking {
            commands.append(run_chunk(&bound, task));
        }
        Ok(next)
    }
}

impl std::fmt::Debug for SystemManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemManager")
            .field("systems", &self.systems.len())
            .field("workers", &self.pool.current_num_threads())
            .field("tick", &self.tick)
            .finish_non_exhaustive()
    }
}
