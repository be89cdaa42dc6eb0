//! HTTP surface (§6), wired onto an `actix_web::App` the way the teacher's
//! `ServicesBuilder::run` registers `web::resource`s.

pub mod branches;
pub mod graph;
pub mod objects;
pub mod relationships;
pub mod search;

use actix_web::web;

/// Registers every route named in §6, all under the `/graph` prefix
/// ("JSON endpoints under `/graph`"), in a single `configure` closure so
/// `main` and integration tests share one definition.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/graph")
            .service(
                web::scope("/objects")
                    .route("", web::get().to(objects::list_objects))
                    .route("", web::post().to(objects::create_object))
                    .route("/tags", web::get().to(objects::object_tags))
                    .route("/fts", web::get().to(objects::objects_fts))
                    .route("/vector-search", web::post().to(objects::objects_vector_search))
                    .route("/bulk-update-status", web::post().to(objects::bulk_update_status))
                    .route("/{id}", web::get().to(objects::get_object))
                    .route("/{id}", web::patch().to(objects::patch_object))
                    .route("/{id}", web::delete().to(objects::delete_object))
                    .route("/{id}/restore", web::post().to(objects::restore_object))
                    .route("/{id}/history", web::get().to(objects::object_history))
                    .route("/{id}/edges", web::get().to(objects::object_edges))
                    .route("/{id}/similar", web::get().to(objects::object_similar)),
            )
            .service(
                web::scope("/relationships")
                    .route("", web::post().to(relationships::create_relationship))
                    .route("/{id}", web::get().to(relationships::get_relationship))
                    .route("/{id}", web::patch().to(relationships::patch_relationship))
                    .route("/{id}", web::delete().to(relationships::delete_relationship))
                    .route("/{id}/history", web::get().to(relationships::relationship_history)),
            )
            .route("/search", web::post().to(search::hybrid_search))
            .route("/search-with-neighbors", web::post().to(search::search_with_neighbors))
            .route("/expand", web::post().to(graph::expand))
            .route("/traverse", web::post().to(graph::traverse))
            .service(
                web::scope("/branches")
                    .route("/{target}/merge", web::post().to(branches::merge_preview)),
            ),
    );
}
