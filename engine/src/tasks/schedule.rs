//! Schedule computation: contracts to edges to a cycle-checked total order.
//!
//! One computation pass walks the graph's state machine end to end:
//!
//! 1. **Contracts** — each task's contract callback runs (once ever; the
//!    result is cached across passes).
//! 2. **Contributors** — every identity maps to the list of tasks fulfilling
//!    it. An identity is usually fulfilled by exactly one task, but several
//!    concrete tasks may all satisfy one abstract stage identity.
//! 3. **Edges** — each Before/After requirement expands over the
//!    contributor lists on both sides into `required` edges.
//! 4. **Topological sort** — depth-first post-order insertion with
//!    memoization. The tick mask filters at the root call only; prerequisites
//!    are inserted regardless of their own masks. A task re-entered while on
//!    the DFS stack is a cycle: every adjacent pair along the cycle is logged
//!    ("`X` must execute after `Y`") and the pass fails with no usable
//!    schedule — a cycle is a static authoring mistake, never a runtime
//!    condition to recover from.
//! 5. **Compaction** — abstract tasks drop out of the output; their ordering
//!    influence survives in the edges they anchored.

use std::collections::HashMap;
use std::fmt;

use fixedbitset::FixedBitSet;
use log::{debug, error};

use crate::ecs::World;
use crate::tasks::graph::{OrderKind, TaskFn, TaskGraph, Tick};

/// Failure to compute a schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    /// The ordering requirements form a cycle; no valid order exists.
    Cycle {
        /// The task names along the cycle, first repeated at the end.
        chain: Vec<&'static str>,
    },
}

impl fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cycle { chain } => {
                write!(f, "task ordering cycle: {}", chain.join(" -> "))
            }
        }
    }
}

impl std::error::Error for ScheduleError {}

/// A computed, cycle-free, tick-filtered execution order.
///
/// Task names and functions are index-aligned parallel arrays; abstract
/// stages are already compacted out.
pub struct Schedule {
    names: Vec<&'static str>,
    functions: Vec<TaskFn>,
}

impl Schedule {
    /// The ordered task names.
    #[inline]
    pub fn task_names(&self) -> &[&'static str] {
        &self.names
    }

    /// The ordered task functions, index-aligned with the names.
    #[inline]
    pub fn functions(&self) -> &[TaskFn] {
        &self.functions
    }

    /// The number of executable tasks.
    #[inline]
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Whether the schedule holds no executable tasks.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Execute every task in order, sequentially.
    pub fn run(&self, world: &mut World) {
        for function in &self.functions {
            function(world);
        }
    }
}

impl fmt::Debug for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schedule").field("tasks", &self.names).finish()
    }
}

impl TaskGraph {
    /// Compute the execution order for one tick phase.
    ///
    /// Fails — producing no schedule at all — when the ordering requirements
    /// contain a cycle. Surfacing that to whoever bootstraps the simulation
    /// is the caller's job; it is fatal configuration, not a transient
    /// condition.
    ///
    /// # Panics
    ///
    /// Panics if a contract orders against an identity that no registered
    /// task fulfills: that can only arise from a coding mistake, never from
    /// runtime data.
    pub fn schedule(&mut self, tick: Tick) -> Result<Schedule, ScheduleError> {
        // Contracts are evaluated on the first pass and cached; the scratch
        // edge lists are rebuilt every pass.
        for node in &mut self.tasks {
            if node.contract.is_none() {
                node.contract = Some(node.def.build_contract());
            }
            node.required.clear();
        }

        // Identity -> contributing task indices.
        let mut contributors: HashMap<_, Vec<usize>> = HashMap::new();
        for (index, node) in self.tasks.iter().enumerate() {
            let contract = node.contract.as_ref().expect("contract populated above");
            for dependency in &contract.fulfills {
                contributors.entry(*dependency).or_default().push(index);
            }
        }

        // Expand each requirement over the contributor lists on both sides.
        let mut edges: Vec<(usize, usize)> = Vec::new();
        for (index, node) in self.tasks.iter().enumerate() {
            let contract = node.contract.as_ref().expect("contract populated above");
            let ours = &contributors[&node.def.identity()];
            for requirement in &contract.requirements {
                let theirs = contributors
                    .get(&requirement.dependency)
                    .unwrap_or_else(|| {
                        panic!(
                            "no registered task fulfills dependency '{}' required by task '{}'",
                            requirement.dependency,
                            node.def.name()
                        )
                    });
                match requirement.kind {
                    // We run before them: each of theirs requires each of ours.
                    OrderKind::Before => {
                        for &them in theirs {
                            for &us in ours {
                                edges.push((them, us));
                            }
                        }
                    }
                    // We run after them: each of ours requires each of theirs.
                    OrderKind::After => {
                        for &us in ours {
                            for &them in theirs {
                                edges.push((us, them));
                            }
                        }
                    }
                }
            }
        }
        for (task, requires) in edges {
            self.tasks[task].required.push(requires);
        }

        // Depth-first insertion, filtering by mask at the root calls only.
        let count = self.tasks.len();
        let mut done = FixedBitSet::with_capacity(count);
        let mut on_stack = FixedBitSet::with_capacity(count);
        let mut stack = Vec::new();
        let mut order = Vec::with_capacity(count);

        let mut result = Ok(());
        for index in 0..count {
            if !self.tasks[index].def.mask().matches(tick) {
                continue;
            }
            result = self.insert_task(index, &mut done, &mut on_stack, &mut stack, &mut order);
            if result.is_err() {
                break;
            }
        }

        // The edge lists are scratch state; drop them even on failure.
        for node in &mut self.tasks {
            node.required.clear();
        }
        result?;

        // Compact out the abstract anchors.
        let mut names = Vec::with_capacity(order.len());
        let mut functions = Vec::with_capacity(order.len());
        for index in order {
            if let Some(function) = self.tasks[index].def.function() {
                names.push(self.tasks[index].def.name());
                functions.push(function);
            }
        }

        debug!("computed schedule: [{}]", names.join(" -> "));
        Ok(Schedule { names, functions })
    }

    fn insert_task(
        &self,
        index: usize,
        done: &mut FixedBitSet,
        on_stack: &mut FixedBitSet,
        stack: &mut Vec<usize>,
        order: &mut Vec<usize>,
    ) -> Result<(), ScheduleError> {
        if done.contains(index) {
            return Ok(());
        }

        if on_stack.contains(index) {
            // Re-entered a task currently being inserted: the stack from its
            // first occurrence down to here is the cycle.
            let position = stack
                .iter()
                .position(|&task| task == index)
                .expect("on-stack task must be in the stack");
            let mut chain: Vec<&'static str> = stack[position..]
                .iter()
                .map(|&task| self.tasks[task].def.name())
                .collect();
            chain.push(self.tasks[index].def.name());
            for pair in chain.windows(2) {
                error!("task '{}' must execute after task '{}'", pair[0], pair[1]);
            }
            return Err(ScheduleError::Cycle { chain });
        }

        on_stack.insert(index);
        stack.push(index);

        for &required in &self.tasks[index].required {
            self.insert_task(required, done, on_stack, stack, order)?;
        }

        stack.pop();
        on_stack.set(index, false);

        // Post-order append: every prerequisite already precedes this task.
        order.push(index);
        done.insert(index);
        Ok(())
    }
}
