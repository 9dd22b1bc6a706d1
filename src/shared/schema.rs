diesel::table! {
    companies (id) {
        id -> Uuid,
        name -> Text,
        slug -> Text,
        email -> Nullable<Text>,
        phone -> Nullable<Text>,
        address -> Nullable<Text>,
        settings -> Jsonb,
        is_active -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    users (id) {
        id -> Uuid,
        company_id -> Uuid,
        email -> Text,
        password_hash -> Text,
        display_name -> Text,
        role -> Text,
        is_active -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    employees (id) {
        id -> Uuid,
        company_id -> Uuid,
        user_id -> Nullable<Uuid>,
        employee_code -> Text,
        first_name -> Text,
        last_name -> Nullable<Text>,
        email -> Nullable<Text>,
        phone -> Nullable<Text>,
        department -> Nullable<Text>,
        position -> Nullable<Text>,
        hourly_rate -> Numeric,
        hire_date -> Nullable<Date>,
        pin_hash -> Nullable<Text>,
        status -> Text,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    attendance_records (id) {
        id -> Uuid,
        company_id -> Uuid,
        employee_id -> Uuid,
        work_date -> Date,
        check_in -> Nullable<Timestamptz>,
        check_out -> Nullable<Timestamptz>,
        break_start -> Nullable<Timestamptz>,
        break_end -> Nullable<Timestamptz>,
        total_hours -> Numeric,
        overtime_hours -> Numeric,
        notes -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    leave_requests (id) {
        id -> Uuid,
        company_id -> Uuid,
        employee_id -> Uuid,
        leave_type -> Text,
        start_date -> Date,
        end_date -> Date,
        days -> Int4,
        reason -> Nullable<Text>,
        status -> Text,
        decided_by -> Nullable<Uuid>,
        decided_at -> Nullable<Timestamptz>,
        decision_note -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    payroll_records (id) {
        id -> Uuid,
        company_id -> Uuid,
        employee_id -> Uuid,
        period_start -> Date,
        period_end -> Date,
        regular_hours -> Numeric,
        overtime_hours -> Numeric,
        hourly_rate -> Numeric,
        regular_pay -> Numeric,
        overtime_pay -> Numeric,
        allowances -> Numeric,
        deductions -> Numeric,
        gross_pay -> Numeric,
        net_pay -> Numeric,
        status -> Text,
        paid_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    performance_reviews (id) {
        id -> Uuid,
        company_id -> Uuid,
        employee_id -> Uuid,
        reviewer_id -> Nullable<Uuid>,
        period -> Text,
        productivity_score -> Int4,
        quality_score -> Int4,
        teamwork_score -> Int4,
        comments -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    customers (id) {
        id -> Uuid,
        company_id -> Uuid,
        name -> Text,
        email -> Nullable<Text>,
        phone -> Nullable<Text>,
        industry -> Nullable<Text>,
        address -> Nullable<Text>,
        owner_id -> Nullable<Uuid>,
        status -> Text,
        notes -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    leads (id) {
        id -> Uuid,
        company_id -> Uuid,
        name -> Text,
        email -> Nullable<Text>,
        phone -> Nullable<Text>,
        company_name -> Nullable<Text>,
        source -> Text,
        status -> Text,
        interest -> Nullable<Text>,
        owner_id -> Nullable<Uuid>,
        notes -> Nullable<Text>,
        converted_customer_id -> Nullable<Uuid>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    opportunities (id) {
        id -> Uuid,
        company_id -> Uuid,
        customer_id -> Nullable<Uuid>,
        lead_id -> Nullable<Uuid>,
        name -> Text,
        stage -> Text,
        amount -> Numeric,
        probability -> Int4,
        expected_close_date -> Nullable<Date>,
        owner_id -> Nullable<Uuid>,
        closed_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    quotes (id) {
        id -> Uuid,
        company_id -> Uuid,
        customer_id -> Uuid,
        quote_number -> Text,
        status -> Text,
        valid_until -> Nullable<Date>,
        subtotal -> Numeric,
        discount -> Numeric,
        total -> Numeric,
        notes -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    quote_items (id) {
        id -> Uuid,
        quote_id -> Uuid,
        product_id -> Nullable<Uuid>,
        description -> Text,
        quantity -> Int4,
        unit_price -> Numeric,
        line_total -> Numeric,
    }
}

diesel::table! {
    orders (id) {
        id -> Uuid,
        company_id -> Uuid,
        customer_id -> Uuid,
        quote_id -> Nullable<Uuid>,
        order_number -> Text,
        status -> Text,
        total -> Numeric,
        notes -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    invoices (id) {
        id -> Uuid,
        company_id -> Uuid,
        customer_id -> Uuid,
        order_id -> Nullable<Uuid>,
        invoice_number -> Text,
        status -> Text,
        issue_date -> Nullable<Date>,
        due_date -> Nullable<Date>,
        total -> Numeric,
        amount_paid -> Numeric,
        notes -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    payments (id) {
        id -> Uuid,
        company_id -> Uuid,
        invoice_id -> Uuid,
        amount -> Numeric,
        method -> Text,
        reference -> Nullable<Text>,
        paid_at -> Timestamptz,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    products (id) {
        id -> Uuid,
        company_id -> Uuid,
        sku -> Text,
        name -> Text,
        description -> Nullable<Text>,
        category -> Nullable<Text>,
        unit_price -> Numeric,
        cost -> Numeric,
        stock_quantity -> Int4,
        reorder_level -> Int4,
        status -> Text,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    stock_movements (id) {
        id -> Uuid,
        company_id -> Uuid,
        product_id -> Uuid,
        delta -> Int4,
        reason -> Text,
        created_by -> Nullable<Uuid>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    promotions (id) {
        id -> Uuid,
        company_id -> Uuid,
        name -> Text,
        description -> Nullable<Text>,
        discount_type -> Text,
        discount_value -> Numeric,
        starts_on -> Date,
        ends_on -> Date,
        is_active -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    credit_limits (id) {
        id -> Uuid,
        company_id -> Uuid,
        customer_id -> Uuid,
        credit_limit -> Numeric,
        current_exposure -> Numeric,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    deliveries (id) {
        id -> Uuid,
        company_id -> Uuid,
        order_id -> Uuid,
        scheduled_date -> Nullable<Date>,
        status -> Text,
        receipt_key -> Nullable<Text>,
        receipt_name -> Nullable<Text>,
        receipt_size -> Nullable<Int8>,
        delivered_at -> Nullable<Timestamptz>,
        notes -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    notifications (id) {
        id -> Uuid,
        company_id -> Uuid,
        user_id -> Uuid,
        title -> Text,
        message -> Text,
        entity_type -> Nullable<Text>,
        entity_id -> Nullable<Uuid>,
        is_read -> Bool,
        read_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    documents (id) {
        id -> Uuid,
        company_id -> Uuid,
        name -> Text,
        category -> Nullable<Text>,
        mime_type -> Text,
        size_bytes -> Int8,
        storage_key -> Text,
        entity_type -> Nullable<Text>,
        entity_id -> Nullable<Uuid>,
        uploaded_by -> Nullable<Uuid>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    approvals (id) {
        id -> Uuid,
        company_id -> Uuid,
        entity_type -> Text,
        entity_id -> Uuid,
        requested_by -> Uuid,
        status -> Text,
        approver_id -> Nullable<Uuid>,
        decision_note -> Nullable<Text>,
        decided_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::joinable!(users -> companies (company_id));
diesel::joinable!(employees -> companies (company_id));
diesel::joinable!(attendance_records -> employees (employee_id));
diesel::joinable!(leave_requests -> employees (employee_id));
diesel::joinable!(payroll_records -> employees (employee_id));
diesel::joinable!(performance_reviews -> employees (employee_id));
diesel::joinable!(quote_items -> quotes (quote_id));
diesel::joinable!(payments -> invoices (invoice_id));
diesel::joinable!(stock_movements -> products (product_id));
diesel::joinable!(credit_limits -> customers (customer_id));
diesel::joinable!(deliveries -> orders (order_id));

diesel::allow_tables_to_appear_in_same_query!(
    companies,
    users,
    employees,
    attendance_records,
    leave_requests,
    payroll_records,
    performance_reviews,
    customers,
    leads,
    opportunities,
    quotes,
    quote_items,
    orders,
    invoices,
    payments,
    products,
    stock_movements,
    promotions,
    credit_limits,
    deliveries,
    notifications,
    documents,
    approvals,
);
