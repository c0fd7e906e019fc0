pub(crate) mod corrections;
pub(crate) mod events;
