//! Vector clocks over execution events.
//!
//! Two flavours exist. `View` assumes downward closure: if an index is in
//! the clock, so are all its po-predecessors. `DepView` drops that
//! assumption by tracking per-thread "holes": indices below the maximum
//! that are nevertheless not in the clock, which is what the prefix under a
//! dependency relation looks like.
//!
//! Merge laws (checked by the tests below):
//! * after `merge_with`, every event contained in either operand is
//!   contained in the result;
//! * a hole survives a merge only if neither operand covers that index.

mod depview;
mod view;

pub use depview::DepView;
pub use view::View;
