use serde::Serialize;

/// Which templates a consumer is currently looking at.
///
/// Fee rate lookups belong to the active view; switching views cancels the
/// ones still in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActiveView {
    /// Latest template of every pool.
    #[default]
    Live,
    /// Every pool's last template at a past height.
    Historical(u64),
}
