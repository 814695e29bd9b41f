//! Task definitions, dependency identities, and ordering contracts.

use std::fmt;
use std::ops::BitOr;

use crate::ecs::World;

/// An opaque token naming a milestone a task can fulfill or order against.
///
/// Every task fulfills the identity carrying its own name; abstract stage
/// tasks exist so that many concrete tasks can order against one shared
/// identity without knowing each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dependency(&'static str);

impl Dependency {
    /// Construct a dependency token from its name.
    #[inline]
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// The token's name.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// One simulation phase, identified by a single mask bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tick(u32);

impl Tick {
    /// The variable-rate gameplay phase.
    pub const GAMEPLAY: Tick = Tick(1 << 0);

    /// The fixed-rate physics phase.
    pub const PHYSICS: Tick = Tick(1 << 1);

    /// The presentation phase.
    pub const RENDER: Tick = Tick(1 << 2);

    /// Construct a phase from a raw mask bit.
    #[inline]
    pub const fn from_bit(bit: u32) -> Self {
        Self(bit)
    }

    /// The phase's mask bit.
    #[inline]
    pub const fn bit(&self) -> u32 {
        self.0
    }
}

/// A set of phases a task participates in.
///
/// The zero mask is "always": such a task runs in every phase.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickMask(u32);

impl TickMask {
    /// Participate in every phase.
    pub const ALWAYS: TickMask = TickMask(0);

    /// Whether the mask admits the given phase.
    #[inline]
    pub const fn matches(&self, tick: Tick) -> bool {
        self.0 == 0 || self.0 & tick.bit() != 0
    }
}

impl From<Tick> for TickMask {
    #[inline]
    fn from(tick: Tick) -> Self {
        Self(tick.bit())
    }
}

impl BitOr<Tick> for TickMask {
    type Output = TickMask;

    #[inline]
    fn bitor(self, rhs: Tick) -> TickMask {
        TickMask(self.0 | rhs.bit())
    }
}

impl BitOr for Tick {
    type Output = TickMask;

    #[inline]
    fn bitor(self, rhs: Tick) -> TickMask {
        TickMask(self.bit() | rhs.bit())
    }
}

/// Which side of a dependency's contributors a task lands on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderKind {
    /// The declaring task's contributors run before the dependency's.
    Before,
    /// The declaring task's contributors run after the dependency's.
    After,
}

/// One ordering requirement from a task's contract.
#[derive(Debug, Clone, Copy)]
pub(crate) struct OrderRequirement {
    pub(crate) dependency: Dependency,
    pub(crate) kind: OrderKind,
}

/// A task's declared fulfillments and ordering requirements.
///
/// Built once per task by its contract callback; the task's own identity is
/// seeded into `fulfills` before the callback runs.
#[derive(Debug, Clone)]
pub struct Contract {
    pub(crate) fulfills: Vec<Dependency>,
    pub(crate) requirements: Vec<OrderRequirement>,
}

impl Contract {
    pub(crate) fn seeded(identity: Dependency) -> Self {
        Self {
            fulfills: vec![identity],
            requirements: Vec::new(),
        }
    }

    /// Declare that this task's completion also fulfills the given identity.
    pub fn fulfills(&mut self, dependency: Dependency) {
        self.fulfills.push(dependency);
    }

    /// Require this task to run before everything fulfilling the identity.
    pub fn execute_before(&mut self, dependency: Dependency) {
        self.requirements.push(OrderRequirement {
            dependency,
            kind: OrderKind::Before,
        });
    }

    /// Require this task to run after everything fulfilling the identity.
    pub fn execute_after(&mut self, dependency: Dependency) {
        self.requirements.push(OrderRequirement {
            dependency,
            kind: OrderKind::After,
        });
    }
}

/// The callable a concrete task contributes to the frame.
pub type TaskFn = fn(&mut World);

/// One registered task: identity, callable, phases, and contract callback.
pub struct TaskDefinition {
    name: &'static str,
    function: Option<TaskFn>,
    mask: TickMask,
    contract_fn: Box<dyn Fn(&mut Contract)>,
}

impl TaskDefinition {
    /// Define a concrete task. Its name is also its dependency identity.
    pub fn new(name: &'static str, function: TaskFn) -> Self {
        Self {
            name,
            function: Some(function),
            mask: TickMask::ALWAYS,
            contract_fn: Box::new(|_| {}),
        }
    }

    /// Define an abstract stage: a task with no function that exists purely
    /// as an ordering anchor. It never appears in the executable schedule.
    pub fn stage(name: &'static str) -> Self {
        Self {
            name,
            function: None,
            mask: TickMask::ALWAYS,
            contract_fn: Box::new(|_| {}),
        }
    }

    /// Restrict the task to the given phases.
    pub fn with_mask(mut self, mask: impl Into<TickMask>) -> Self {
        self.mask = mask.into();
        self
    }

    /// Set the contract callback.
    ///
    /// The callback runs lazily, once, when a schedule is first computed —
    /// after every task exists — so it may reference identities regardless
    /// of registration order.
    pub fn with_contract(mut self, contract: impl Fn(&mut Contract) + 'static) -> Self {
        self.contract_fn = Box::new(contract);
        self
    }

    /// The task's diagnostic name.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The identity this task's completion represents.
    #[inline]
    pub fn identity(&self) -> Dependency {
        Dependency::new(self.name)
    }

    /// The task's function, absent for abstract stages.
    #[inline]
    pub fn function(&self) -> Option<TaskFn> {
        self.function
    }

    /// The phases the task participates in.
    #[inline]
    pub fn mask(&self) -> TickMask {
        self.mask
    }

    pub(crate) fn build_contract(&self) -> Contract {
        let mut contract = Contract::seeded(self.identity());
        (self.contract_fn)(&mut contract);
        contract
    }
}

impl fmt::Debug for TaskDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDefinition")
            .field("name", &self.name)
            .field("abstract", &self.function.is_none())
            .field("mask", &self.mask)
            .finish()
    }
}

/// One node of the task graph: the definition plus scheduling scratch state.
pub(crate) struct TaskNode {
    pub(crate) def: TaskDefinition,

    /// The contract, populated on first schedule computation and cached.
    pub(crate) contract: Option<Contract>,

    /// Tasks that must run before this one. Rebuilt from contracts during
    /// each schedule computation and cleared afterwards.
    pub(crate) required: Vec<usize>,
}

/// The registered tasks of one simulation context.
///
/// Registration order is irrelevant; ordering comes entirely from the
/// contracts. Like the type registry, the graph is a context object the
/// driver owns and passes around — there is no global list.
#[derive(Default)]
pub struct TaskGraph {
    pub(crate) tasks: Vec<TaskNode>,
}

impl TaskGraph {
    /// Create an empty task graph.
    pub fn new() -> Self {
        Self { tasks: Vec::new() }
    }

    /// Register a task.
    pub fn register(&mut self, def: TaskDefinition) {
        self.tasks.push(TaskNode {
            def,
            contract: None,
            required: Vec::new(),
        });
    }

    /// The number of registered tasks, abstract stages included.
    #[inline]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether no tasks are registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn always_mask_matches_every_tick() {
        assert!(TickMask::ALWAYS.matches(Tick::GAMEPLAY));
        assert!(TickMask::ALWAYS.matches(Tick::PHYSICS));
        assert!(TickMask::ALWAYS.matches(Tick::RENDER));
    }

    #[test]
    fn masks_compose_with_or() {
        // Given
        let mask = Tick::GAMEPLAY | Tick::RENDER;

        // Then
        assert!(mask.matches(Tick::GAMEPLAY));
        assert!(mask.matches(Tick::RENDER));
        assert!(!mask.matches(Tick::PHYSICS));

        // And a three-way union
        let mask = mask | Tick::PHYSICS;
        assert!(mask.matches(Tick::PHYSICS));
    }

    #[test]
    fn contract_is_seeded_with_own_identity() {
        // Given
        fn noop(_: &mut World) {}
        let def = TaskDefinition::new("Simulate", noop).with_contract(|c| {
            c.fulfills(Dependency::new("FrameWork"));
            c.execute_after(Dependency::new("Input"));
        });

        // When
        let contract = def.build_contract();

        // Then
        assert_eq!(
            contract.fulfills,
            vec![Dependency::new("Simulate"), Dependency::new("FrameWork")]
        );
        assert_eq!(contract.requirements.len(), 1);
        assert_eq!(contract.requirements[0].dependency, Dependency::new("Input"));
        assert_eq!(contract.requirements[0].kind, OrderKind::After);
    }

    #[test]
    fn stages_have_no_function() {
        // Given
        let stage = TaskDefinition::stage("PostUpdate");

        // Then
        assert!(stage.function().is_none());
        assert_eq!(stage.identity(), Dependency::new("PostUpdate"));
    }

    #[test]
    fn graph_registration() {
        // Given
        fn noop(_: &mut World) {}
        let mut graph = TaskGraph::new();
        assert!(graph.is_empty());

        // When
        graph.register(TaskDefinition::new("A", noop));
        graph.register(TaskDefinition::stage("B"));

        // Then
        assert_eq!(graph.len(), 2);
    }
}
