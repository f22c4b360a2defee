//! arbortrace-export: Pure format serializers (sans-IO)
//!
//! Converts reconstructed skeletons into output formats. Currently supports
//! the annotation-tool JSON document and SWC text. Both serializers return
//! strings; file writing lives in `arbortrace-io`.

pub mod catmaid;
pub mod swc;

pub use catmaid::{
    CatmaidDocument, ExportError, ExportMetadata, MaskRecord, Treenode, to_catmaid_json,
};
pub use swc::to_swc;
