use logcluster::analyzer::Analyzer;
use logcluster::config::{AnalyzerConfig, ConfigError};
use logcluster::identifiers::{Identifiers, IdentifiersConfig};

fn analyzer(soft_limit: usize, hard_limit: usize, min_similarity: f64, min_precision: f64) -> Analyzer {
    Analyzer::new(AnalyzerConfig { soft_limit, hard_limit, min_similarity, min_precision }).unwrap()
}

fn texts(a: &Analyzer) -> Vec<String> {
    a.clusters().iter().map(|c| c.to_text("@@")).collect()
}

fn worker_lines() -> Vec<String> {
    let mut lines = Vec::new();
    for i in 0..40u32 {
        lines.push(format!("worker {} finished job {} in {}ms", i % 3, i * 7, (i * 13) % 1000));
        if i % 4 == 0 {
            lines.push(format!("connection from 10.0.{}.{} accepted", i % 5, i));
        }
        if i % 9 == 0 {
            lines.push(format!("checkpoint {} written", i));
        }
        if i % 11 == 0 {
            lines.push("disk almost full".to_string());
        }
    }
    lines
}

#[test]
fn simple_analysis_generalizes_first_two_lines() {
    let mut a = analyzer(2, 2, 0.5, 0.5);
    a.analyze_line("abc def ghi").unwrap();
    assert_eq!(texts(&a), vec!["abc def ghi"]);
    a.analyze_line("abc xxx 123 123 ghi").unwrap();
    assert_eq!(texts(&a), vec!["abc def ghi", "abc xxx 123 123 ghi"]);
    a.analyze_line("foo bar").unwrap();

    assert_eq!(texts(&a), vec!["foo bar", "abc @@3,11@@ ghi"]);
    let merged = &a.clusters()[1];
    assert!(merged.matches_line("abc def ghi"));
    assert!(merged.matches_line("abc xxx 123 123 ghi"));
    assert_eq!(merged.match_count(), 2);
}

#[test]
fn high_similarity_evicts_oldest_instead_of_merging() {
    let mut a = analyzer(2, 2, 0.99, 0.6);
    a.analyze_line("foo bar").unwrap();
    a.analyze_line("foo ghi xxx").unwrap();
    a.analyze_line("bar xxx").unwrap();
    assert_eq!(texts(&a), vec!["foo ghi xxx", "bar xxx"]);
}

#[test]
fn high_similarity_below_hard_limit_keeps_all_clusters() {
    let mut a = analyzer(2, 10, 0.99, 0.6);
    for line in ["foo bar", "foo ghi xxx", "bar xxx"] {
        a.analyze_line(line).unwrap();
    }
    assert_eq!(texts(&a), vec!["foo bar", "foo ghi xxx", "bar xxx"]);
}

#[test]
fn working_set_never_exceeds_hard_limit() {
    let mut a = analyzer(3, 5, 0.6, 0.6);
    for line in worker_lines() {
        let owner = a.analyze_line(&line).unwrap().expect("non-empty line has an owner");
        assert!(a.clusters().len() <= 5, "{:?}", texts(&a));
        let cluster = a.clusters().iter().find(|c| c.id() == owner).expect("owner is in the working set");
        assert!(cluster.matches_line(&line), "{} rejects {line}", cluster.pattern());
    }
    assert_eq!(a.lines_seen(), worker_lines().len() as u64);
}

#[test]
fn rematching_changes_only_statistics() {
    let mut a = analyzer(3, 5, 0.6, 0.6);
    let lines = worker_lines();
    for line in &lines {
        a.analyze_line(line).unwrap();
    }
    let patterns: Vec<String> = a.clusters().iter().map(|c| c.pattern().to_string()).collect();
    let total: u64 = a.clusters().iter().map(|c| c.match_count()).sum();

    let last = lines.last().unwrap();
    a.analyze_line(last).unwrap();

    let after: Vec<String> = a.clusters().iter().map(|c| c.pattern().to_string()).collect();
    assert_eq!(patterns, after);
    assert_eq!(a.clusters().iter().map(|c| c.match_count()).sum::<u64>(), total + 1);
}

#[test]
fn invalid_config_is_rejected_at_construction() {
    let config = AnalyzerConfig { soft_limit: 10, hard_limit: 5, ..AnalyzerConfig::default() };
    let err = Analyzer::new(config).unwrap_err();
    assert_eq!(err, ConfigError::HardLimit { soft: 10, hard: 5 });
}

#[test]
fn identifiers_generalize_new_clusters() {
    let config = IdentifiersConfig::parse("NUM [0-9]+\n").unwrap();
    let identifiers = Identifiers::compile(&config).unwrap();
    let mut a = Analyzer::with_identifiers(AnalyzerConfig::default(), identifiers).unwrap();

    let first = a.analyze_line("request took 15 ms").unwrap();
    let second = a.analyze_line("request took 2048 ms").unwrap();
    assert_eq!(first, second);
    assert_eq!(a.clusters().len(), 1);
    assert_eq!(a.clusters()[0].match_count(), 2);
    assert!(!a.clusters()[0].matches_line("request took many ms"));
}

#[test]
fn summaries_serialize_to_json() {
    let mut a = analyzer(2, 2, 0.5, 0.5);
    for line in ["abc def ghi", "abc xxx 123 123 ghi", "foo bar", "foo bar"] {
        a.analyze_line(line).unwrap();
    }
    let summaries = a.summaries("@@");
    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].text, "foo bar");
    assert_eq!(summaries[0].match_count, 2);
    assert_eq!(summaries[0].last_seen_line, 4);

    let json = serde_json::to_value(&summaries).unwrap();
    assert_eq!(json[1]["text"], "abc @@3,11@@ ghi");
    assert_eq!(json[1]["pattern"], "^abc .{3,11} ghi$");
    assert_eq!(json[1]["min_len"], 11);
    assert_eq!(json[1]["max_len"], 19);
}

fn numbered_analyzer(soft_limit: usize, hard_limit: usize) -> Analyzer {
    let config = IdentifiersConfig::parse(
        "NUM [0-9]+\n!OCTET [0-9]{1,3}\nADDR %{OCTET}\\.%{OCTET}\\.%{OCTET}\\.%{OCTET}\n",
    )
    .unwrap();
    let identifiers = Identifiers::compile(&config).unwrap();
    let config = AnalyzerConfig { soft_limit, hard_limit, min_similarity: 0.5, min_precision: 0.5 };
    Analyzer::with_identifiers(config, identifiers).unwrap()
}

fn numbered_lines() -> Vec<String> {
    let mut lines = worker_lines();
    for i in 0..30u32 {
        lines.push(format!("user {} {}", 10u32.pow(i % 8), ["x", "y", "z"][(i % 3) as usize]));
        if i % 6 == 0 {
            lines.push(format!("start {} end", i * 1111));
            lines.push("start end".to_string());
        }
    }
    lines
}

#[test]
fn identifier_stream_keeps_working_set_invariants() {
    let mut a = numbered_analyzer(3, 5);
    for line in numbered_lines() {
        let accepted_before = a.clusters().iter().filter(|c| c.matches_line(&line)).count();
        let owner = a.analyze_line(&line).unwrap().expect("non-empty line has an owner");

        assert!(a.clusters().len() <= 5, "{:?}", texts(&a));
        let cluster = a.clusters().iter().find(|c| c.id() == owner).expect("owner is in the working set");
        assert!(cluster.matches_line(&line), "{} rejects {line}", cluster.pattern());
        if accepted_before == 0 {
            let accepting = a.clusters().iter().filter(|c| c.matches_line(&line)).count();
            assert_eq!(accepting, 1, "{line} in {:?}", texts(&a));
        }
    }
}

#[test]
fn merged_identifier_cluster_absorbs_new_line() {
    let mut a = numbered_analyzer(2, 5);
    a.analyze_line("user 12345678 x").unwrap();
    a.analyze_line("user 12345679 y").unwrap();
    a.analyze_line("user 5 z").unwrap();

    assert_eq!(a.clusters().len(), 1);
    assert_eq!(a.clusters().iter().filter(|c| c.matches_line("user 5 z")).count(), 1);
    assert_eq!(a.clusters()[0].match_count(), 3);
}
