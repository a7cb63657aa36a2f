use vcollector_model::*;

#[test]
fn job_definition_round_trips_through_yaml() {
    let job = JobDefinition {
        job_id: "arp-sweep".into(),
        capture_type: "arp".into(),
        vendor: Some("cisco_ios".into()),
        commands: CommandSpec {
            paging_disable: Some("terminal length 0".into()),
            command: "show ip arp".into(),
            output_directory: Some("arp".into()),
        },
        device_filter: DeviceFilter {
            site: Some("dc1".into()),
            ..Default::default()
        },
        validation: ValidationBlock {
            use_textfsm: true,
            template_filter: None,
            min_score: 1.0,
            store_failures: false,
        },
        execution: ExecutionBlock::default(),
        storage: StorageBlock {
            base_path: "/var/captures".into(),
            filename_pattern: "{device_name}_{timestamp}.txt".into(),
        },
        credential: Some(CredentialRef::new("lab-default")),
        limit: None,
    };

    let yaml = serde_yaml::to_string(&job).expect("serialize job");
    let restored: JobDefinition = serde_yaml::from_str(&yaml).expect("deserialize job");
    assert_eq!(restored.job_id, "arp-sweep");
    assert_eq!(restored.execution.max_workers, 12);
    assert_eq!(
        restored.commands.assemble(),
        "terminal length 0,show ip arp"
    );
}

#[test]
fn device_round_trips_through_yaml() {
    let device = Device {
        id: "edge-j1".into(),
        name: "Edge-J1".into(),
        primary_ip4: "10.0.0.2".into(),
        ssh_port: 22,
        preferred_credential: Some("lab-default".into()),
        platform: PlatformHints {
            vendor: Some("Juniper Networks".into()),
            netmiko_type: Some("juniper_junos".into()),
            paging_disable_cmd: None,
        },
        site: Some("oslo".into()),
        role: Some("edge".into()),
        status: Some("active".into()),
        credential_test_result: CredentialTestOutcome::Untested,
        credential_tested_at: None,
    };

    let yaml = serde_yaml::to_string(&device).expect("serialize device");
    let loaded: Device = serde_yaml::from_str(&yaml).expect("deserialize device");
    assert_eq!(loaded.name, "Edge-J1");
    assert_eq!(loaded.credential_test_result, CredentialTestOutcome::Untested);
}

#[test]
fn job_result_status_serializes_snake_case() {
    let row = HistoryRow::open("h1", "arp-sweep", chrono::Utc::now());
    let json = serde_json::to_string(&row).expect("serialize row");
    assert!(json.contains("\"running\""));
}
