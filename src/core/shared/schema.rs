diesel::table! {
    empresas (id) {
        id -> Int4,
        nombre -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    users (id) {
        id -> Int4,
        username -> Varchar,
        email -> Varchar,
        password_hash -> Varchar,
        role -> Text,
        empresa_id -> Nullable<Int4>,
        is_active -> Bool,
        smtp_password -> Nullable<Varchar>,
    }
}

diesel::table! {
    tickets (id) {
        id -> Int4,
        title -> Varchar,
        description -> Text,
        status -> Text,
        prioridad -> Text,
        categoria -> Text,
        tipo -> Text,
        creator_id -> Int4,
        usuario_solicitante_id -> Nullable<Int4>,
        assigned_to_id -> Nullable<Int4>,
        empresa_id -> Int4,
        archivo_nombre -> Array<Text>,
        message -> Nullable<Text>,
        confirmado_por_usuario -> Bool,
        fecha_confirmacion -> Nullable<Timestamptz>,
        rechazado_por_usuario -> Bool,
        fecha_rechazo -> Nullable<Timestamptz>,
        sla_total_minutos -> Nullable<Int4>,
        sla_start_at -> Nullable<Timestamptz>,
        sla_green_end_at -> Nullable<Timestamptz>,
        sla_yellow_end_at -> Nullable<Timestamptz>,
        deadline_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    ticket_history (id) {
        id -> Int4,
        ticket_id -> Int4,
        actualizado_por_id -> Int4,
        status_anterior -> Nullable<Text>,
        status_nuevo -> Nullable<Text>,
        prioridad_anterior -> Nullable<Text>,
        prioridad_nueva -> Nullable<Text>,
        mensaje -> Nullable<Text>,
        adjunto_nombre -> Array<Text>,
        fecha -> Timestamptz,
    }
}

diesel::table! {
    notifications (id) {
        id -> Int4,
        user_id -> Int4,
        ticket_id -> Int4,
        #[sql_name = "type"]
        kind -> Text,
        message -> Text,
        is_read -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(users -> empresas (empresa_id));
diesel::joinable!(tickets -> empresas (empresa_id));
diesel::joinable!(ticket_history -> tickets (ticket_id));
diesel::joinable!(ticket_history -> users (actualizado_por_id));
diesel::joinable!(notifications -> tickets (ticket_id));
diesel::joinable!(notifications -> users (user_id));

diesel::allow_tables_to_appear_in_same_query!(
    empresas,
    users,
    tickets,
    ticket_history,
    notifications,
);
