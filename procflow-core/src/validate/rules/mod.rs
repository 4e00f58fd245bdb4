pub(crate) mod container;
pub(crate) mod node;
pub(crate) mod process;
