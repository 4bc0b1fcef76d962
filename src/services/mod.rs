mod mirror_transport;
pub(crate) use mirror_transport::*;
