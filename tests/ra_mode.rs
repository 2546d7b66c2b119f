use reinforced_lib::agents::ParticleFilter;
use reinforced_lib::bridge::{ActRecord, EnvRecord, RecordKind};
use reinforced_lib::envs::{MobilityModel, WifiConfig, WifiSimulation};
use reinforced_lib::exts::Ieee80211axRa;
use reinforced_lib::modes::{RaConfig, RaMode};
use reinforced_lib::spaces::Value;
use reinforced_lib::RLib;
use tempfile::TempDir;

fn short_config(n_wifi: usize, simulation_time: f64) -> WifiConfig {
    WifiConfig {
        n_wifi,
        simulation_time,
        ..WifiConfig::default()
    }
}

#[test]
fn test_bridge_loop_adapts_close_station() {
    let mut sim = WifiSimulation::new(short_config(1, 2.0), 3).unwrap();
    let mut rl = RLib::<ParticleFilter>::builder()
        .agent_param("particles_num", 300usize)
        .ext(Box::new(Ieee80211axRa::new()))
        .build()
        .unwrap();
    rl.init(Some(3));

    let mut last_mcs = Vec::new();
    loop {
        let record = EnvRecord::decode(&sim.poll().unwrap()).unwrap();
        if record.kind == RecordKind::Finished {
            break;
        }
        let mcs = rl.sample(&record.to_observation(), record.station_id as usize, true).unwrap();
        let act = ActRecord {
            station_id: record.station_id,
            mcs: mcs as u8,
        };
        sim.respond(&act.encode()).unwrap();
        last_mcs.push(mcs);
    }

    assert_eq!(last_mcs.len(), 200);
    assert!(sim.is_finished());

    // 10 m from the AP the channel supports the high MCS values
    let tail = &last_mcs[150..];
    let mean = tail.iter().sum::<usize>() as f64 / tail.len() as f64;
    assert!(mean > 5.0, "mean MCS at the end of the run: {}", mean);
}

#[test]
fn test_poll_requires_response() {
    let mut sim = WifiSimulation::new(short_config(2, 1.0), 0).unwrap();
    let record = EnvRecord::decode(&sim.poll().unwrap()).unwrap();
    assert_eq!(record.kind, RecordKind::Transmission);
    assert!(sim.poll().is_err());

    let wrong = ActRecord {
        station_id: record.station_id + 1,
        mcs: 0,
    };
    assert!(sim.respond(&wrong.encode()).is_err());

    let right = ActRecord {
        station_id: record.station_id,
        mcs: 4,
    };
    sim.respond(&right.encode()).unwrap();
    let next = EnvRecord::decode(&sim.poll().unwrap()).unwrap();
    assert_eq!(next.station_id, 1);
}

#[test]
fn test_ra_mode_with_random_waypoints() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = RaConfig::new(temp_dir.path().join("rwpm.csv"));
    config.wifi = WifiConfig {
        mobility_model: MobilityModel::Rwpm,
        ..short_config(3, 0.5)
    };
    config.agent_params.insert("particles_num".into(), Value::Int(100));

    let summary = RaMode::new(config.clone()).run().unwrap();
    assert_eq!(summary.decisions, 150);

    let csv = std::fs::read_to_string(&config.csv_path).unwrap();
    let rows: Vec<Vec<&str>> = csv.lines().skip(1).map(|line| line.split(',').collect()).collect();
    assert_eq!(rows.len(), 150);
    for row in &rows {
        let station: usize = row[1].parse().unwrap();
        let next_mcs: usize = row[7].parse().unwrap();
        assert!(station < 3);
        assert!(next_mcs < 12);
    }
}

#[test]
fn test_ra_mode_rejects_invalid_scenario() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = RaConfig::new(temp_dir.path().join("results.csv"));
    config.wifi.n_wifi = 0;
    assert!(RaMode::new(config.clone()).run().is_err());
    assert!(!config.csv_path.exists());
}
