pub mod help_view;
pub mod meters;
pub mod status_bar;

pub use help_view::render_help_view;
pub use meters::{render_level_meter, render_spectrum, render_time_bar};
pub use status_bar::render_status_bar;
