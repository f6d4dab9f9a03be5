pub mod perimeters;
pub mod run;
pub mod util;
