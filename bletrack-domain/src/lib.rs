pub mod clock;
pub mod identity;
pub mod kalman;
pub mod path_loss;
pub mod record;
pub mod registry;
pub mod snapshot;
