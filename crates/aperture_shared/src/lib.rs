pub mod frame;
pub mod pipeline;
pub mod portal;
pub mod projection;
pub mod render_target;
pub mod scene;
pub mod surface;
pub mod transform;
pub mod traversal;
pub mod viewer;
pub mod visibility;
