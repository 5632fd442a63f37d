// Administrative HTTP surface consumed by the host's configuration layer.

pub mod handler;
