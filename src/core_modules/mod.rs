pub mod ambient;
pub mod calibration;
pub mod color_classifier;
pub mod feedback;
pub mod frame;
pub mod frame_sampler;
pub mod pixel;
pub mod settings;
pub mod tracker;
pub mod utils;
