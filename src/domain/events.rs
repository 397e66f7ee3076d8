//! Event streams produced by the fetcher and transcoder adapters.

use futures::stream::BoxStream;

/// One item of an adapter's progress sequence. A well-behaved stream yields any
/// number of `Progress` values followed by exactly one `Finished`.
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterEvent<T, E> {
    Progress(u8),
    Finished(Result<T, E>),
}

pub type EventStream<T, E> = BoxStream<'static, AdapterEvent<T, E>>;

/// Converts a raw percentage reported by an external tool to a whole percent.
pub fn percent_from_f64(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.clamp(0.0, 100.0).floor() as u8
}
