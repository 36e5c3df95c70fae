use std::sync::Arc;

use dfc_library::{
    resolve::{CoreQueries, CoreStorage},
    store::Library,
};
use dfc_query::{graph::Graph, GraphQueries, GraphStorage};

/// Everything the back end asks about: the library and the graph.
pub trait BackEnd: CoreQueries + GraphQueries {}

impl<T: CoreQueries + GraphQueries> BackEnd for T {}

#[salsa::database(CoreStorage, GraphStorage)]
#[derive(Default)]
pub struct Database {
    storage: salsa::Storage<Database>,
}

impl salsa::Database for Database {}

impl Database {
    pub fn new(library: Library, graph: Graph) -> Self {
        let mut db = Database::default();
        db.set_library(Arc::new(library));
        db.set_graph(Arc::new(graph));
        db
    }
}
