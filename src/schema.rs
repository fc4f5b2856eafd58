// @generated-style schema module, hand-written to match the tables this
// crate actually uses (see `repository::diesel_task_store`).

diesel::table! {
    tasks (task_id) {
        task_id -> Text,
        status -> Text,
        mode -> Text,
        dataset_size -> BigInt,
        batch_size -> BigInt,
        total_batches -> BigInt,
        completed_batches -> BigInt,
        progress -> Double,
        current_phase -> Nullable<Text>,
        start_time -> Text,
        end_time -> Nullable<Text>,
        error -> Nullable<Text>,
        statistics -> Text,
        dataset_blob -> Text,
        knowledge_blob -> Nullable<Text>,
        guidance_blob -> Nullable<Text>,
        save_reports -> Bool,
        created_at -> Text,
    }
}

diesel::table! {
    batch_results (task_id, batch_index) {
        task_id -> Text,
        batch_index -> BigInt,
        stage -> Text,
        records -> Text,
        counters -> Text,
    }
}

diesel::allow_tables_to_appear_in_same_query!(tasks, batch_results,);
