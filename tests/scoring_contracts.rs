use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use tempfile::TempDir;

use rolloutlens::config::ScoringConfig;
use rolloutlens::db;
use rolloutlens::models::project::{Lifecycle, Project, StoreClass};
use rolloutlens::models::score::{LoadBand, RiskBand};
use rolloutlens::scoring::capacity::classify_utilization;
use rolloutlens::scoring::{capacity, forecast, performance, risk, status};

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

fn project(external_id: &str) -> Project {
    Project {
        id: 0,
        external_id: external_id.to_string(),
        name: format!("Loja {external_id}"),
        external_store_id: None,
        status_raw: "em implantação".to_string(),
        status: Lifecycle::InProgress,
        created_at: Some(now() - Duration::days(30)),
        started_at: None,
        completed_at: None,
        closed_at: None,
        manual_started_at: None,
        manual_finished_at: None,
        contract_days: Some(90),
        monthly_value: 500.0,
        setup_value: 0.0,
        financial_status: Some("Em dia".to_string()),
        had_rework: false,
        delivered_with_quality: true,
        idle_days: 0,
        operator: Some("ana".to_string()),
        class: StoreClass::Filial,
        network: None,
        parent_id: None,
        erp: None,
        cnpj: None,
        crm: None,
        pauses: Vec::new(),
    }
}

#[test]
fn scenario_a_overrun_project_lands_in_attention() {
    let cfg = ScoringConfig::default();
    let mut p = project("a1");
    p.created_at = Some(now() - Duration::days(120));

    let score = risk::risk_score(&p, None, now(), &cfg);

    // 120 of 90 contract days: the schedule pillar maxes out while every
    // other pillar stays at zero, so only 45% of the weight is in play.
    assert_eq!(score.breakdown.schedule.raw_score, 100.0);
    assert_eq!(score.breakdown.idleness.raw_score, 0.0);
    assert_eq!(score.breakdown.financial.raw_score, 0.0);
    assert_eq!(score.breakdown.quality.raw_score, 0.0);
    assert_eq!(score.total, 45.0);
    assert_eq!(score.band, RiskBand::Attention);
}

#[test]
fn scenario_b_clean_high_volume_operator_outranks_messy_low_volume_one() {
    let cfg = ScoringConfig::default();
    let mut projects = Vec::new();

    for i in 0..10 {
        let mut p = project(&format!("a{i}"));
        p.operator = Some("ana".to_string());
        p.class = StoreClass::Matriz;
        p.status = Lifecycle::Done;
        p.status_raw = "concluído".to_string();
        p.created_at = Some(now() - Duration::days(100));
        p.completed_at = Some(now() - Duration::days(40)); // 60d, on time
        projects.push(p);
    }

    let mut on_time = project("b1");
    on_time.operator = Some("bruno".to_string());
    on_time.status = Lifecycle::Done;
    on_time.created_at = Some(now() - Duration::days(100));
    on_time.completed_at = Some(now() - Duration::days(40));
    projects.push(on_time);

    let mut late_rework = project("b2");
    late_rework.operator = Some("bruno".to_string());
    late_rework.status = Lifecycle::Done;
    late_rework.had_rework = true;
    late_rework.created_at = Some(now() - Duration::days(160));
    late_rework.completed_at = Some(now() - Duration::days(40)); // 120d, late
    projects.push(late_rework);

    let ranking = performance::performance_ranking(&projects, None, now(), &cfg);
    assert_eq!(ranking[0].operator, "ana");
    let ana = &ranking[0];
    let bruno = ranking.iter().find(|e| e.operator == "bruno").unwrap();
    assert!(ana.score > bruno.score);
    assert_eq!(ana.breakdown.volume.raw_score, 100.0);
    assert!(!ana.low_sample);
    assert!(bruno.low_sample);
}

#[test]
fn scenario_c_manual_finish_survives_later_tracker_closure() {
    init_logs();
    let tmp = TempDir::new().expect("temp dir");
    let conn = db::get_connection(&tmp.path().join("state.db")).expect("open db");

    let mut patch = db::ProjectPatch {
        external_id: "t1".to_string(),
        name: "Loja Centro".to_string(),
        external_store_id: None,
        status_raw: "em implantação".to_string(),
        status: Lifecycle::InProgress,
        created_at: Some(now() - Duration::days(100)),
        started_at: None,
        completed_at: None,
        closed_at: None,
        operator: Some("ana".to_string()),
        idle_days: Some(0),
        monthly_value: Some(400.0),
        setup_value: None,
        erp: None,
        cnpj: None,
        crm: None,
    };
    let id = db::upsert_synced_project(&conn, &patch).expect("insert");

    let manual_finish = now() - Duration::days(20);
    db::set_manual_finished(&conn, id, Some(manual_finish)).expect("manual finish");

    // The tracker later reports a closure after the manual date.
    patch.status_raw = "concluído".to_string();
    patch.status = Lifecycle::Done;
    patch.closed_at = Some(now() - Duration::days(5));
    db::upsert_synced_project(&conn, &patch).expect("update");

    let projects = db::load_projects(&conn).expect("load");
    assert_eq!(projects[0].effective_finished_at(), Some(manual_finish));
    assert_eq!(projects[0].days_in_progress(now()), 80);
}

#[test]
fn status_normalization_contract_holds() {
    assert_eq!(status::normalize(""), Lifecycle::InProgress);
    assert_eq!(status::normalize("Concluído"), Lifecycle::Done);
}

#[test]
fn risk_is_monotonic_in_idle_days_holding_all_else_fixed() {
    let cfg = ScoringConfig::default();
    let mut previous = -1.0;
    for idle in [0, 2, 3, 5, 6, 10, 11, 20, 21, 40] {
        let mut p = project("i1");
        p.idle_days = idle;
        let score = risk::risk_score(&p, None, now(), &cfg);
        assert!(score.total >= previous, "idle={idle} lowered the score");
        previous = score.total;
    }
}

#[test]
fn utilization_bands_cover_every_non_negative_value() {
    let cfg = ScoringConfig::default();
    let mut pct = 0.0;
    while pct < 300.0 {
        // classify_utilization is total over [0, inf): every value gets
        // exactly one band, and bands never move backwards as load grows.
        let band = classify_utilization(pct, &cfg);
        let next = classify_utilization(pct + 0.5, &cfg);
        assert!(band_rank(next) >= band_rank(band), "band regressed at {pct}");
        pct += 0.5;
    }
    assert_eq!(classify_utilization(0.0, &cfg), LoadBand::Low);
    assert_eq!(classify_utilization(1e9, &cfg), LoadBand::Critical);
}

fn band_rank(band: LoadBand) -> u8 {
    match band {
        LoadBand::Low => 0,
        LoadBand::Normal => 1,
        LoadBand::High => 2,
        LoadBand::Critical => 3,
    }
}

#[test]
fn pause_heavy_project_scores_lower_schedule_risk_than_its_raw_age() {
    let tmp = TempDir::new().expect("temp dir");
    let conn = db::get_connection(&tmp.path().join("state.db")).expect("open db");

    let patch = db::ProjectPatch {
        external_id: "t1".to_string(),
        name: "Loja Pausada".to_string(),
        external_store_id: None,
        status_raw: "em implantação".to_string(),
        status: Lifecycle::InProgress,
        created_at: Some(now() - Duration::days(100)),
        started_at: None,
        completed_at: None,
        closed_at: None,
        operator: Some("ana".to_string()),
        idle_days: Some(0),
        monthly_value: None,
        setup_value: None,
        erp: None,
        cnpj: None,
        crm: None,
    };
    let id = db::upsert_synced_project(&conn, &patch).expect("insert");

    // 60 of the 100 elapsed days were frozen waiting on the customer.
    let pause_id = db::open_pause(&conn, id, now() - Duration::days(80), Some("aguardando cliente"))
        .expect("open pause");
    db::close_pause(&conn, pause_id, now() - Duration::days(20)).expect("close pause");

    let cfg = ScoringConfig::default();
    let projects = db::load_projects(&conn).expect("load");
    let p = &projects[0];
    assert_eq!(p.days_in_progress(now()), 40);

    let score = risk::risk_score(p, None, now(), &cfg);
    // 40/90 sits under the 0.65 bound; without the pause credit the ratio
    // would have been 100/90 and the pillar 85.
    assert_eq!(score.breakdown.schedule.raw_score, 10.0);
}

#[test]
fn capacity_and_forecast_read_the_same_committed_state() {
    let cfg = ScoringConfig::default();
    let mut projects = Vec::new();

    for i in 0..3 {
        let mut p = project(&format!("w{i}"));
        p.operator = Some("ana".to_string());
        p.network = Some("Rede Azul".to_string());
        p.class = if i == 0 { StoreClass::Matriz } else { StoreClass::Filial };
        projects.push(p);
    }
    let mut done = project("d1");
    done.status = Lifecycle::Done;
    done.status_raw = "concluído".to_string();
    done.created_at = Some(now() - Duration::days(70));
    done.completed_at = Some(now() - Duration::days(10));
    projects.push(done);

    let capacity_report = capacity::team_capacity(&projects, now(), &cfg);
    assert_eq!(capacity_report.len(), 1);
    let ana = &capacity_report[0];
    assert_eq!(ana.store_count, 3);
    assert_eq!(ana.current_points, 1.0 + 0.7 + 0.7);
    assert_eq!(ana.active_networks, vec!["Rede Azul"]);
    assert_eq!(ana.band, LoadBand::Low);

    let months = forecast::financial_forecast(&projects, 6, now(), &cfg);
    let may = months.iter().find(|m| m.month == "2025-05").unwrap();
    assert_eq!(may.realized, 500.0);
    // WIP stores started 30 days ago with a 60-day observed cycle project
    // into July.
    let july = months.iter().find(|m| m.month == "2025-07").unwrap();
    assert_eq!(july.projected, 1500.0);
}

#[test]
fn daily_snapshot_round_trips_through_a_file_backed_store() {
    init_logs();
    let tmp = TempDir::new().expect("temp dir");
    let conn = db::get_connection(&tmp.path().join("state.db")).expect("open db");

    let patch = db::ProjectPatch {
        external_id: "t1".to_string(),
        name: "Loja Centro".to_string(),
        external_store_id: None,
        status_raw: "em implantação".to_string(),
        status: Lifecycle::InProgress,
        created_at: Some(now() - Duration::days(120)),
        started_at: None,
        completed_at: None,
        closed_at: None,
        operator: Some("ana".to_string()),
        idle_days: Some(3),
        monthly_value: Some(650.0),
        setup_value: None,
        erp: None,
        cnpj: None,
        crm: None,
    };
    db::upsert_synced_project(&conn, &patch).expect("insert");

    let cfg = ScoringConfig::default();
    let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
    let written = db::take_daily_snapshot(&conn, date, now(), &cfg).expect("snapshot");
    assert_eq!(written, 1);

    let rows = db::load_daily_snapshots(&conn, date).expect("load snapshots");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].operator.as_deref(), Some("ana"));
    assert_eq!(rows[0].days_in_progress, 120);
    // Matches scenario A: schedule pillar saturated, 45.0 total.
    assert_eq!(rows[0].risk_total, 45.0);
    assert_eq!(rows[0].monthly_value, 650.0);
}
