use log::{debug, info, warn};

use ranked_tally::*;
use snafu::{prelude::*, Snafu};

use std::fs;

use serde::{Deserialize, Serialize};
use serde_json::json;
use serde_json::Map as JSMap;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::app::config_reader::*;

#[derive(Debug, Snafu)]
pub enum AppError {
    #[snafu(display("Error opening file {path}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display(""))]
    ParsingJson { source: serde_json::Error },
    #[snafu(display(""))]
    ParsingJsonNumber {},
    #[snafu(display("Error writing file {path}"))]
    WritingJson {
        source: std::io::Error,
        path: String,
    },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type AppResult<T> = Result<T, AppError>;

pub mod config_reader {
    use crate::app::*;

    #[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
    pub struct SessionSettings {
        #[serde(rename = "contestName")]
        pub contest_name: String,
        #[serde(rename = "contestDate")]
        pub contest_date: Option<String>,
        #[serde(rename = "contestOffice")]
        pub contest_office: Option<String>,
    }

    #[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
    pub struct OutputConfig {
        pub contest: String,
        pub date: Option<String>,
        pub office: Option<String>,
    }

    #[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
    pub struct SessionCandidate {
        pub name: String,
        pub excluded: Option<bool>,
    }

    #[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
    pub struct SessionRules {
        #[serde(rename = "rigPolicy")]
        pub rig_policy: String,
        #[serde(rename = "targetTotal")]
        pub target_total: Option<JSValue>,
        #[serde(rename = "randomSeed")]
        pub random_seed: Option<String>,
    }

    /// A scripted vote: the candidate receives `count` votes (default 1).
    #[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
    pub struct VoteRecord {
        pub candidate: String,
        pub count: Option<u64>,
    }

    #[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
    pub struct SessionConfig {
        #[serde(rename = "sessionSettings")]
        pub session_settings: SessionSettings,
        pub candidates: Vec<SessionCandidate>,
        pub rules: SessionRules,
        pub votes: Option<Vec<VoteRecord>>,
        #[serde(rename = "randomVotes")]
        pub random_votes: Option<u64>,
        pub rig: Option<String>,
    }

    pub fn read_config(path: &str) -> AppResult<SessionConfig> {
        let contents = fs::read_to_string(path).context(OpeningJsonSnafu {
            path: path.to_string(),
        })?;
        debug!("read config: {:?}", contents);
        let config: SessionConfig =
            serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})?;
        Ok(config)
    }

    pub fn read_summary(path: String) -> AppResult<JSValue> {
        let contents = fs::read_to_string(path.clone())
            .context(OpeningJsonSnafu { path })?;
        debug!("read content: {:?}", contents);
        let js: JSValue = serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})?;
        Ok(js)
    }

    pub fn read_js_int(x: &Option<JSValue>) -> AppResult<u64> {
        match x {
            Some(JSValue::Number(n)) => n.as_u64().context(ParsingJsonNumberSnafu {}),
            Some(JSValue::String(s)) => s.parse::<u64>().ok().context(ParsingJsonNumberSnafu {}),
            _ => None.context(ParsingJsonNumberSnafu {}),
        }
    }
}

fn validate_rules(session_rules: &SessionRules, seed_override: Option<u32>) -> AppResult<TallyRules> {
    let rig_policy = match session_rules.rig_policy.as_str() {
        "minimalIncrement" => RigPolicy::MinimalIncrement,
        "resetToTarget" => {
            let target = read_js_int(&session_rules.target_total)?;
            RigPolicy::ResetToTarget(target)
        }
        x => {
            whatever!("Cannot use rig policy {:?} (currently not implemented)", x)
        }
    };
    let random_seed = match (seed_override, session_rules.random_seed.clone()) {
        (Some(seed), _) => seed,
        (None, Some(s)) => match s.parse::<u32>() {
            Result::Ok(x) => x,
            x => {
                whatever!("Failed to understand randomSeed option: {:?}", x)
            }
        },
        (None, None) => 0,
    };
    Ok(TallyRules {
        rig_policy,
        random_seed,
    })
}

fn build_summary_js(
    settings: &SessionSettings,
    audit: &[RankedEntry],
    top: &[String],
    total_votes: u64,
) -> JSValue {
    let c = OutputConfig {
        contest: settings.contest_name.clone(),
        date: settings.contest_date.clone(),
        office: settings.contest_office.clone(),
    };
    let mut tally: JSMap<String, JSValue> = JSMap::new();
    for (name, count) in audit.iter() {
        tally.insert(name.clone(), json!(count.to_string()));
    }
    json!({
        "config": c,
        "totalVotes": total_votes.to_string(),
        "tally": tally,
        "topCandidates": top,
    })
}

fn print_audit(audit: &[RankedEntry]) {
    println!("auditElection():");
    for (name, count) in audit.iter() {
        println!("{} - {}", name, count);
    }
}

pub fn run_session(
    config_path: String,
    summary_out: Option<String>,
    check_summary_path: Option<String>,
    top: usize,
    seed_override: Option<u32>,
) -> AppResult<()> {
    let config = read_config(config_path.as_str())?;
    info!("config: {:?}", config);

    // Validate the rules:
    let rules = validate_rules(&config.rules, seed_override)?;

    let candidates: Vec<String> = config
        .candidates
        .iter()
        .filter_map(|c| {
            if c.excluded.unwrap_or(false) {
                debug!("excluding candidate {:?}", c.name);
                None
            } else {
                Some(c.name.clone())
            }
        })
        .collect();

    let mut engine = TallyEngine::new(&rules);
    engine
        .initialize(&candidates)
        .whatever_context("Failed to initialize the tally")?;

    // Replay the scripted votes first.
    for record in config.votes.clone().unwrap_or_default() {
        let count = record.count.unwrap_or(1);
        for _ in 0..count {
            let accepted = engine
                .cast_vote(record.candidate.as_str())
                .whatever_context("Failed to cast a vote")?;
            if !accepted {
                warn!("skipping vote for unknown candidate {:?}", record.candidate);
                break;
            }
        }
    }

    // Then the random ones.
    for _ in 0..config.random_votes.unwrap_or(0) {
        engine
            .cast_random_vote()
            .whatever_context("Failed to cast a random vote")?;
    }

    if let Some(rigged) = config.rig.clone() {
        let accepted = engine
            .rig_election(rigged.as_str())
            .whatever_context("Failed to rig the election")?;
        if !accepted {
            whatever!("Cannot rig the election for unknown candidate {:?}", rigged);
        }
        info!("election rigged for {:?}", rigged);
    }

    let top_names = engine
        .top_k(top)
        .whatever_context("Failed to query the leading candidates")?;
    let audit = engine
        .audit()
        .whatever_context("Failed to audit the tally")?;
    let total_votes = engine
        .total_votes()
        .whatever_context("Failed to read the total")?;

    println!("Top {} candidates: {:?}", top_names.len(), top_names);
    print_audit(&audit);

    // Assemble the final json
    let summary_js = build_summary_js(&config.session_settings, &audit, &top_names, total_votes);
    let pretty_js_summary = serde_json::to_string_pretty(&summary_js).context(ParsingJsonSnafu {})?;

    match summary_out {
        None => {}
        Some(p) if p == "stdout" => println!("summary:{}", pretty_js_summary),
        Some(p) => {
            fs::write(p.clone(), pretty_js_summary.as_bytes())
                .context(WritingJsonSnafu { path: p })?;
        }
    }

    // The reference summary, if provided for comparison
    if let Some(summary_p) = check_summary_path {
        let summary_ref = read_summary(summary_p)?;
        info!("summary: {:?}", summary_ref);
        let pretty_js_summary_ref =
            serde_json::to_string_pretty(&summary_ref).context(ParsingJsonSnafu {})?;
        if pretty_js_summary_ref != pretty_js_summary {
            warn!("Found differences with the reference string");
            print_diff(
                pretty_js_summary_ref.as_str(),
                pretty_js_summary.as_ref(),
                "\n",
            );
            whatever!("Difference detected between calculated summary and reference summary")
        }
    }

    Ok(())
}

// The pool that the randomized sessions draw their candidates from.
const CANDIDATE_POOL: [&str; 10] = [
    "Alice Jensen",
    "Bob Kowalski",
    "Carol Tanaka",
    "Dan Okafor",
    "Erin Murphy",
    "Frank Castillo",
    "Grace Lindqvist",
    "Henry Abara",
    "Iris Novak",
    "Jack Meyer",
];

/// Runs `num_sessions` randomized tally sessions, printing the outcome of
/// each one. Every draw is keyed on the seed, so a run can be replayed
/// exactly by passing the same seed again.
pub fn run_simulations(num_sessions: u32, seed: u32, top: usize) -> AppResult<()> {
    let pool: Vec<String> = CANDIDATE_POOL.iter().map(|s| s.to_string()).collect();

    for session in 1..=num_sessions {
        let num_candidates = 3 + seeded_pick(seed, session * 3, 5); // 3..=7
        let target_total = (5 + seeded_pick(seed, session * 3 + 1, 11)) as u64; // 5..=15

        let shuffled = candidate_permutation_crypto(&pool, seed, session);
        let candidates: Vec<String> = shuffled.into_iter().take(num_candidates).collect();

        let rules = TallyRules {
            rig_policy: RigPolicy::ResetToTarget(target_total),
            random_seed: seed.wrapping_add(session),
        };
        let mut engine = TallyEngine::new(&rules);
        engine
            .initialize(&candidates)
            .whatever_context("Failed to initialize the tally")?;

        println!("=== Randomized session #{} ===", session);
        println!("Candidates: {:?}", candidates);
        println!("Target total (p): {}", target_total);

        for _ in 0..target_total {
            engine
                .cast_random_vote()
                .whatever_context("Failed to cast a random vote")?;
        }

        let k = std::cmp::min(top, candidates.len());
        let before = engine
            .top_k(k)
            .whatever_context("Failed to query the leading candidates")?;
        println!("Top {} candidates after voting: {:?}", k, before);

        let rigged = candidates[seeded_pick(seed, session * 3 + 2, candidates.len())].clone();
        engine
            .rig_election(rigged.as_str())
            .whatever_context("Failed to rig the election")?;
        println!("Election rigged for: {}", rigged);

        let after = engine
            .top_k(k)
            .whatever_context("Failed to query the leading candidates")?;
        println!("Top {} candidates after rigging: {:?}", k, after);

        let audit = engine
            .audit()
            .whatever_context("Failed to audit the tally")?;
        print_audit(&audit);
        println!("------");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn session_rules(policy: &str, target: Option<JSValue>, seed: Option<&str>) -> SessionRules {
        SessionRules {
            rig_policy: policy.to_string(),
            target_total: target,
            random_seed: seed.map(|s| s.to_string()),
        }
    }

    #[test]
    fn validate_rules_minimal_increment() {
        let rules = validate_rules(&session_rules("minimalIncrement", None, None), None).unwrap();
        assert_eq!(rules.rig_policy, RigPolicy::MinimalIncrement);
        assert_eq!(rules.random_seed, 0);
    }

    #[test]
    fn validate_rules_reset_to_target() {
        let rules =
            validate_rules(&session_rules("resetToTarget", Some(json!(12)), None), None).unwrap();
        assert_eq!(rules.rig_policy, RigPolicy::ResetToTarget(12));

        // The target may also be given as a string, like the other numeric options.
        let rules =
            validate_rules(&session_rules("resetToTarget", Some(json!("7")), None), None).unwrap();
        assert_eq!(rules.rig_policy, RigPolicy::ResetToTarget(7));
    }

    #[test]
    fn validate_rules_unknown_policy() {
        let res = validate_rules(&session_rules("stuffTheBoxes", None, None), None);
        assert!(res.is_err());
    }

    #[test]
    fn validate_rules_seed_override_wins() {
        let rules =
            validate_rules(&session_rules("minimalIncrement", None, Some("3")), Some(9)).unwrap();
        assert_eq!(rules.random_seed, 9);
        let rules =
            validate_rules(&session_rules("minimalIncrement", None, Some("3")), None).unwrap();
        assert_eq!(rules.random_seed, 3);
    }

    #[test]
    fn summary_includes_full_tally() {
        let settings = SessionSettings {
            contest_name: "test contest".to_string(),
            contest_date: None,
            contest_office: None,
        };
        let audit = vec![("Bob".to_string(), 2), ("Alice".to_string(), 1)];
        let top = vec!["Bob".to_string()];
        let js = build_summary_js(&settings, &audit, &top, 3);
        assert_eq!(js["config"]["contest"], json!("test contest"));
        assert_eq!(js["totalVotes"], json!("3"));
        assert_eq!(js["tally"]["Bob"], json!("2"));
        assert_eq!(js["tally"]["Alice"], json!("1"));
        assert_eq!(js["topCandidates"], json!(["Bob"]));
    }

    #[test]
    fn session_runs_end_to_end() {
        let config = json!({
            "sessionSettings": { "contestName": "end to end" },
            "candidates": [
                { "name": "Alice" },
                { "name": "Bob" },
                { "name": "Carol" },
                { "name": "Mallory", "excluded": true }
            ],
            "rules": { "rigPolicy": "minimalIncrement" },
            "votes": [
                { "candidate": "Bob", "count": 2 },
                { "candidate": "Alice" }
            ],
            "rig": "Carol"
        });
        let mut config_path: PathBuf = std::env::temp_dir();
        config_path.push("votetally_session_test_config.json");
        fs::write(&config_path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

        let res = run_session(
            config_path.display().to_string(),
            None,
            None,
            3,
            None,
        );
        assert!(res.is_ok(), "session failed: {:?}", res.err().map(|e| e.to_string()));
    }

    #[test]
    fn simulations_are_replayable() {
        run_simulations(2, 17, 3).unwrap();
        run_simulations(2, 17, 3).unwrap();
    }
}
