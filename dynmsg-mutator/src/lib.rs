pub mod field;
pub mod mutator;
pub mod sampler;
pub mod value;

pub use mutator::{Mutation, Mutator, SampledMutation};
pub use sampler::{ChaoSampler, WeightedReservoirSampler};
pub use value::{StdValueMutator, ValueMutator};
