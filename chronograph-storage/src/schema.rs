//! Diesel table definitions mirroring the migrations under `migrations/`.
//! Hand-maintained rather than `diesel print-schema`'d, the way the teacher
//! keeps `schema.rs` alongside hand-written `orm.rs` model impls.

diesel::table! {
    use diesel::sql_types::*;
    use diesel_full_text_search::TsVector;
    use pgvector::sql_types::Vector;

    branches (id) {
        id -> Uuid,
        project_id -> Uuid,
        name -> Text,
        parent_branch_id -> Nullable<Uuid>,
        created_at -> Timestamp,
    }
}

diesel::table! {
    branch_lineage (branch_id, ancestor_branch_id) {
        branch_id -> Uuid,
        ancestor_branch_id -> Uuid,
        depth -> Integer,
    }
}

diesel::table! {
    use diesel::sql_types::*;
    use diesel_full_text_search::TsVector;
    use pgvector::sql_types::Vector;

    objects (version_id) {
        version_id -> Uuid,
        entity_id -> Uuid,
        supersedes_id -> Nullable<Uuid>,
        version -> Integer,
        project_id -> Uuid,
        branch_id -> Nullable<Uuid>,
        object_type -> Text,
        key -> Nullable<Text>,
        status -> Nullable<Text>,
        properties -> Jsonb,
        labels -> Array<Text>,
        deleted_at -> Nullable<Timestamp>,
        content_hash -> Bytea,
        fts -> TsVector,
        embedding -> Nullable<Vector>,
        created_at -> Timestamp,
        updated_at -> Timestamp,
        last_accessed_at -> Nullable<Timestamp>,
        actor_id -> Nullable<Text>,
        actor_type -> Nullable<Text>,
        change_summary -> Nullable<Jsonb>,
    }
}

diesel::table! {
    use diesel::sql_types::*;
    use pgvector::sql_types::Vector;

    relationships (version_id) {
        version_id -> Uuid,
        entity_id -> Uuid,
        supersedes_id -> Nullable<Uuid>,
        version -> Integer,
        project_id -> Uuid,
        branch_id -> Nullable<Uuid>,
        relationship_type -> Text,
        src_entity_id -> Uuid,
        dst_entity_id -> Uuid,
        weight -> Nullable<Double>,
        properties -> Nullable<Jsonb>,
        embedding -> Nullable<Vector>,
        deleted_at -> Nullable<Timestamp>,
        content_hash -> Bytea,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

diesel::joinable!(objects -> branches (branch_id));
diesel::joinable!(relationships -> branches (branch_id));
diesel::allow_tables_to_appear_in_same_query!(objects, relationships, branches, branch_lineage);
