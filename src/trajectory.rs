mod builder;
mod gradient;
mod savgol;

pub use builder::{Trajectory, TrajectoryBuilder, TrajectoryRow, group_rows};
pub use gradient::{gradient, time_derivative};
pub use savgol::SavitzkyGolay;
