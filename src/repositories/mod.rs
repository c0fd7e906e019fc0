pub(crate) mod low_confidence_images;
pub(crate) mod questions;
pub(crate) mod responses;
pub(crate) mod students;
