//! Scene host: world storage, actor classes, handles and garbage collection

pub mod class;
pub mod components;
pub mod gc;
pub mod handle;
pub mod invoker;
pub mod world;

pub use class::{ActorClass, ClassBuilder, ClassKind, HandlerFactory};
pub use components::{ActorState, Name, RootPrimitive, SpawnParams, SpawnValue, Transform, Velocity};
pub use gc::{GarbageCollector, GcHookId};
pub use handle::ActorHandle;
pub use invoker::{SimulationTask, TaskQueue};
pub use world::{ActorSnapshot, World};
