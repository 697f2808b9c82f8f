//! Systems: job graphs with dependency-ordered stages.
//!
//! A [`System`] owns a list of [`Job`]s and the explicit dependency edges
//! between them. From these it derives a [`Schedule`]: every job receives a
//! **stage** number, and all jobs sharing a stage may run concurrently.
//!
//! ## Stage assignment
//!
//! - A job with no dependencies is in stage 0.
//! - Otherwise its stage is one plus the highest stage among its
//!   dependencies.
//! - Stages execute in ascending order, so dependencies always run first.
//!
//! Dependencies come from two sources:
//!
//! - **explicit** edges added with [`System::add_dependency`],
//! - **implicit** conflict edges: whenever two jobs' access sets conflict
//!   (one writes what the other reads or writes), the one later in the
//!   topological order of explicit edges depends on the earlier one.
//!
//! The implicit edges make the schedule race-free by construction: two jobs
//! in the same stage never conflict. [`System::auto_dependencies`] turns the
//! conflict edges into explicit ones when callers want them visible.
//!
//! ## Cycles
//!
//! Edges that would close a cycle are rejected by `add_dependency`, logged, and
//! never stored. The stage walk additionally stops at the configured depth
//! limit; jobs past it are logged and left out of the schedule.
//!
//! The schedule is computed lazily and cached until a job or edge is added.

use log::{debug, error};

use crate::engine::error::{ECSResult, SchedulingError};
use crate::engine::job::{Job, JobHandle};
use crate::engine::types::SystemID;


const DEFAULT_MAX_DEPTH: usize = 64;

/// Jobs sharing one stage number.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stage {
    /// Stage number; stages run in ascending order.
    pub index: u32,
    /// Jobs of the stage, in declaration order.
    pub jobs: Vec<JobHandle>,
}

/// Cached stage assignment of a system.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Schedule {
    stages: Vec<Stage>,
    stage_of: Vec<Option<u32>>,
}

impl Schedule {
    /// Non-empty stages in execution order.
    pub fn stages(&self) -> &[Stage] { &self.stages }

    /// Stage of `job`, or `None` if it was left out.
    pub fn stage_of(&self, job: JobHandle) -> Option<u32> {
        self.stage_of.get(job.index()).copied().flatten()
    }

    /// Number of stages.
    pub fn len(&self) -> usize { self.stages.len() }

    /// Returns `true` if nothing is scheduled.
    pub fn is_empty(&self) -> bool { self.stages.is_empty() }
}

/// A named set of jobs and their dependencies.
pub struct System {
    id: SystemID,
    name: &'static str,
    jobs: Vec<Job>,
    dependencies: Vec<Vec<u32>>,
    max_depth: usize,
    schedule: Option<Schedule>,
}

impl System {
    /// Creates an empty system.
    pub fn new(id: SystemID, name: &'static str) -> Self {
        Self {
            id,
            name,
            jobs: Vec::new(),
            dependencies: Vec::new(),
            max_depth: DEFAULT_MAX_DEPTH,
            schedule: None,
        }
    }

    /// Sets the stage depth limit.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.set_max_depth(max_depth);
        self
    }

    pub(crate) fn set_max_depth(&mut self, max_depth: usize) {
        if self.max_depth != max_depth {
            self.max_depth = max_depth;
            self.schedule = None;
        }
    }

    /// System identifier.
    pub fn id(&self) -> SystemID { self.id }

    /// Human-readable name.
    pub fn name(&self) -> &'static str { self.name }

    /// Declared jobs.
    pub fn jobs(&self) -> &[Job] { &self.jobs }

    /// Job behind `handle`.
    pub fn job(&self, handle: JobHandle) -> Option<&Job> { self.jobs.get(handle.index()) }

    pub(crate) fn jobs_mut(&mut self) -> &mut [Job] { &mut self.jobs }

    /// Adds a job; the returned handle is valid for this system only.
    pub fn add_job(&mut self, job: Job) -> JobHandle {
        let handle = JobHandle(self.jobs.len() as u32);
        debug!("system `{}`: job `{}` added as {}", self.name, job.name(), handle.0);
        self.jobs.push(job);
        self.dependencies.push(Vec::new());
        self.schedule = None;
        handle
    }

    /// Explicit dependencies of `job`.
    pub fn dependencies(&self, job: JobHandle) -> &[u32] {
        self.dependencies.get(job.index()).map_or(&[], Vec::as_slice)
    }

    fn validate(&self, job: JobHandle) -> ECSResult<()> {
        if job.index() < self.jobs.len() {
            Ok(())
        } else {
            let e = SchedulingError::UnknownJob(job.0);
            error!("system `{}`: {e}", self.name);
            Err(e.into())
        }
    }

    /// Returns `true` if `from` reaches `to` through explicit edges.
    fn reaches(&self, from: u32, to: u32) -> bool {
        let mut visited = vec![false; self.jobs.len()];
        let mut stack = vec![from];
        while let Some(job) = stack.pop() {
            if job == to {
                return true;
            }
            if std::mem::replace(&mut visited[job as usize], true) {
                continue;
            }
            stack.extend(self.dependencies[job as usize].iter().copied());
        }
        false
    }

    /// Makes `job` depend on `dependency`: `job` runs in a later stage.
    ///
    /// An edge that would create a cycle is logged and rejected. Adding an
    /// existing edge again is a no-op.
    pub fn add_dependency(&mut self, job: JobHandle, dependency: JobHandle) -> ECSResult<()> {
        self.validate(job)?;
        self.validate(dependency)?;

        if self.dependencies[job.index()].contains(&dependency.0) {
            return Ok(());
        }
        if self.reaches(dependency.0, job.0) {
            let e = SchedulingError::Cycle { job: job.0, dependency: dependency.0 };
            error!("system `{}`: {e}; edge skipped", self.name);
            return Err(e.into());
        }

        self.dependencies[job.index()].push(dependency.0);
        self.schedule = None;
        Ok(())
    }

    /// Adds an explicit edge for every conflicting job pair, from the later
    /// declared job to the earlier one. Returns the number of edges added.
    ///
    /// Pairs whose edge would contradict existing explicit edges are left to
    /// the implicit conflict ordering.
    pub fn auto_dependencies(&mut self) -> usize {
        let mut added = 0;
        for later in 0..self.jobs.len() {
            for earlier in 0..later {
                if !self.jobs[later].access().conflicts_with(self.jobs[earlier].access()) {
                    continue;
                }
                let (later, earlier) = (later as u32, earlier as u32);
                if self.dependencies[later as usize].contains(&earlier) || self.reaches(earlier, later) {
                    continue;
                }
                self.dependencies[later as usize].push(earlier);
                added += 1;
            }
        }
        if added > 0 {
            self.schedule = None;
        }
        added
    }

    /// Topological order of explicit edges; ties go to the lowest index.
    fn topological_order(&self) -> Vec<u32> {
        let count = self.jobs.len();
        let mut remaining: Vec<usize> = self.dependencies.iter().map(Vec::len).collect();
        let mut dependents = vec![Vec::new(); count];
        for (job, deps) in self.dependencies.iter().enumerate() {
            for &dep in deps {
                dependents[dep as usize].push(job as u32);
            }
        }

        let mut ready: std::collections::BTreeSet<u32> =
            (0..count as u32).filter(|&j| remaining[j as usize] == 0).collect();
        let mut order = Vec::with_capacity(count);
        while let Some(job) = ready.pop_first() {
            order.push(job);
            for &next in &dependents[job as usize] {
                remaining[next as usize] -= 1;
                if remaining[next as usize] == 0 {
                    ready.insert(next);
                }
            }
        }
        order
    }

    fn compute(&self) -> Schedule {
        let count = self.jobs.len();
        let order = self.topological_order();
        let mut position = vec![usize::MAX; count];
        for (pos, &job) in order.iter().enumerate() {
            position[job as usize] = pos;
        }

        let mut stage_of: Vec<Option<u32>> = vec![None; count];
        for (pos, &job) in order.iter().enumerate() {
            let job = job as usize;
            let access = self.jobs[job].access();

            let explicit = self.dependencies[job].iter().map(|&d| d as usize);
            let implicit = order[..pos]
                .iter()
                .map(|&d| d as usize)
                .filter(|&d| access.conflicts_with(self.jobs[d].access()));

            let mut stage = 0u32;
            let mut blocked = false;
            for dep in explicit.chain(implicit) {
                debug_assert!(position[dep] < pos);
                match stage_of[dep] {
                    Some(s) => stage = stage.max(s + 1),
                    None => blocked = true,
                }
            }

            if blocked {
                error!(
                    "system `{}`: job `{}` depends on an unscheduled job; skipped",
                    self.name,
                    self.jobs[job].name()
                );
            } else if stage as usize >= self.max_depth {
                let e = SchedulingError::DepthExceeded { job: job as u32, limit: self.max_depth };
                error!("system `{}`: {e}; job `{}` skipped", self.name, self.jobs[job].name());
            } else {
                stage_of[job] = Some(stage);
            }
        }

        let stage_count = stage_of.iter().flatten().map(|&s| s + 1).max().unwrap_or(0);
        let mut stages: Vec<Stage> =
            (0..stage_count).map(|index| Stage { index, jobs: Vec::new() }).collect();
        for (job, stage) in stage_of.iter().enumerate() {
            if let Some(stage) = stage {
                stages[*stage as usize].jobs.push(JobHandle(job as u32));
            }
        }
        stages.retain(|stage| !stage.jobs.is_empty());

        debug!("system `{}`: {} jobs in {} stages", self.name, count, stages.len());
        Schedule { stages, stage_of }
    }

    /// Returns the cached schedule, recomputing it if the graph changed.
    pub fn schedule(&mut self) -> &Schedule {
        if self.schedule.is_none() {
            self.schedule = Some(self.compute());
        }
        self.schedule.get_or_insert_with(Schedule::default)
    }

    /// Stages in execution order.
    pub fn stages(&mut self) -> &[Stage] { self.schedule().stages() }

    /// Stage assigned to `job`.
    pub fn stage_of(&mut self, job: JobHandle) -> Option<u32> { self.schedule().stage_of(job) }
}

impl std::fmt::Debug for System {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("System")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("jobs", &self.jobs)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}
