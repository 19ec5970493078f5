//! Diesel table definitions for the persistent state layout of §6. Table
//! names are stable, lowercase snake_case, and carry no foreign keys —
//! integrity is maintained by each adapter's replace-all or delta
//! discipline (§4.1), not by the schema.

diesel::table! {
    openstack_hypervisors (id) {
        id -> Uuid,
        host_name -> Text,
        hypervisor_type -> Text,
        state -> Text,
        status -> Text,
        vcpus -> BigInt,
        vcpus_used -> BigInt,
        memory_mb -> BigInt,
        memory_mb_used -> BigInt,
        local_gb -> BigInt,
        local_gb_used -> BigInt,
        cpu_info -> Jsonb,
        disabled_reason -> Nullable<Text>,
        availability_zone -> Nullable<Text>,
        synced_at -> Timestamptz,
    }
}

diesel::table! {
    openstack_resource_providers (id) {
        id -> Uuid,
        name -> Text,
        host_name -> Nullable<Text>,
        generation -> BigInt,
        synced_at -> Timestamptz,
    }
}

diesel::table! {
    openstack_resource_provider_traits (resource_provider_id, trait_name) {
        resource_provider_id -> Uuid,
        trait_name -> Text,
        synced_at -> Timestamptz,
    }
}

diesel::table! {
    openstack_aggregates (id) {
        id -> BigInt,
        host_name -> Text,
        aggregate_uuid -> Uuid,
        az_name -> Nullable<Text>,
        synced_at -> Timestamptz,
    }
}

diesel::table! {
    openstack_servers (id) {
        id -> Uuid,
        host_name -> Nullable<Text>,
        project_id -> Text,
        user_id -> Text,
        flavor_name -> Text,
        vcpus -> Integer,
        memory_mb -> Integer,
        disk_gb -> Integer,
        status -> Text,
        created -> Timestamptz,
        deleted -> Bool,
        synced_at -> Timestamptz,
    }
}

diesel::table! {
    openstack_flavors (id) {
        id -> Uuid,
        name -> Text,
        vcpus -> Integer,
        memory_mb -> Integer,
        disk_gb -> Integer,
        extra_specs -> Jsonb,
        synced_at -> Timestamptz,
    }
}

diesel::table! {
    openstack_migrations (id) {
        id -> Uuid,
        server_id -> Uuid,
        source_host -> Nullable<Text>,
        dest_host -> Nullable<Text>,
        status -> Text,
        created -> Timestamptz,
        synced_at -> Timestamptz,
    }
}

diesel::table! {
    openstack_storage_pools (id) {
        id -> Text,
        pool_name -> Text,
        backend -> Text,
        capacity_gb -> BigInt,
        free_gb -> BigInt,
        allocated_gb -> BigInt,
        availability_zone -> Nullable<Text>,
        synced_at -> Timestamptz,
    }
}

diesel::table! {
    metric_samples (metric_name, host_name, sample_time) {
        metric_name -> Text,
        host_name -> Text,
        sample_time -> Timestamptz,
        value -> Double,
        labels -> Jsonb,
    }
}

diesel::table! {
    nova_sync (datasource_name) {
        datasource_name -> Text,
        last_success_at -> Nullable<Timestamptz>,
        last_object_count -> BigInt,
        last_error -> Nullable<Text>,
    }
}

diesel::table! {
    reservations (id) {
        id -> Uuid,
        project_id -> Text,
        flavor_name -> Text,
        host_name -> Text,
        requested_vcpus -> Integer,
        requested_memory_mb -> Integer,
        phase -> Text,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    decisions (id) {
        id -> Uuid,
        request_id -> Text,
        pipeline_name -> Text,
        target_host -> Nullable<Text>,
        ordered_hosts -> Jsonb,
        raw_in_weights -> Jsonb,
        normalized_in_weights -> Jsonb,
        aggregated_out_weights -> Jsonb,
        statistics -> Jsonb,
        status -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    feature_az (host_name) {
        host_name -> Text,
        az_name -> Nullable<Text>,
        computed_at -> Timestamptz,
    }
}

diesel::table! {
    feature_capabilities (host_name) {
        host_name -> Text,
        traits -> Jsonb,
        cpu_info -> Jsonb,
        hypervisor_type -> Text,
        disabled -> Bool,
        agent_down -> Bool,
        computed_at -> Timestamptz,
    }
}

diesel::table! {
    feature_utilization (host_name) {
        host_name -> Text,
        vcpus_total -> BigInt,
        vcpus_used -> BigInt,
        vcpu_percent -> Double,
        mem_total_mb -> BigInt,
        mem_used_mb -> BigInt,
        mem_percent -> Double,
        disk_total_gb -> BigInt,
        disk_used_gb -> BigInt,
        disk_percent -> Double,
        computed_at -> Timestamptz,
    }
}

diesel::table! {
    feature_noisy_projects (host_name, project_id) {
        host_name -> Text,
        project_id -> Text,
        avg_cpu_percent -> Double,
        computed_at -> Timestamptz,
    }
}

diesel::table! {
    feature_contention (host_name, window) {
        host_name -> Text,
        window -> Text,
        avg_contention -> Double,
        max_contention -> Double,
        computed_at -> Timestamptz,
    }
}
