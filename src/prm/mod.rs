pub mod builder;
pub mod config;
pub mod query;
pub mod roadmap;
pub mod serialization;

pub use builder::{
    check_graph_linkage, grow_roadmap, make_pruned_copy, update_roadmap_edges,
    EdgeUpdateStatistics, GrowStatistics,
};
pub use config::{EdgeValidation, QueryConfig, RoadmapConfig};
pub use query::{
    lazy_query_path, query_path, query_path_with_strategy, QueryResult, QueryStatistics,
    QueryStrategy,
};
pub use roadmap::{EdgeInfo, RoadmapGraph, RoadmapNode};
pub use serialization::{deserialize_roadmap, load_roadmap, save_roadmap, serialize_roadmap};
