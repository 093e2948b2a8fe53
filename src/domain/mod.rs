// Domain layer: protocol-neutral models and ports (interfaces). No wire-format details here.

pub mod model;
pub mod ports;
