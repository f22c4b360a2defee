//! SWC text serializer.
//!
//! Writes a skeleton as standard SWC: one node per line with columns
//! `id type x y z radius parent`, structure type 0 (undefined), radius
//! [`UNMEASURED_RADIUS`](crate::catmaid::UNMEASURED_RADIUS), and `-1` as
//! the parent of a root. Nodes are emitted in ascending id order.
//!
//! This is a pure function with no I/O -- it returns a `String`.

use arbortrace_pipeline::Skeleton;

use crate::catmaid::UNMEASURED_RADIUS;

/// Serialize a skeleton as SWC text.
#[must_use]
pub fn to_swc(skeleton: &Skeleton) -> String {
    let mut out = String::from("# id type x y z radius parent\n");
    for node in skeleton.nodes() {
        let position = node.position();
        let parent = node
            .parent()
            .map_or_else(|| "-1".to_owned(), |p| p.to_string());
        out.push_str(&format!(
            "{} 0 {} {} {} {} {}\n",
            node.id(),
            position.x,
            position.y,
            position.z,
            UNMEASURED_RADIUS,
            parent,
        ));
    }
    out
}
