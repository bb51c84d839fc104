// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `inventory.rs`

#[cfg(test)]
mod tests {
    use crate::inventory::*;
    use std::io::Write;

    const INVENTORY: &str = r#"[
        {"id": "sfo5", "location": "San Francisco", "country": "US", "subnet": "3.0.0.0/24", "code": "SFO5"},
        {"id": "nrt57", "location": "Tokyo", "country": "Japan", "subnet": "1.66.0.0/24", "code": "NRT57", "neighbors": ["NRT20", "kix56"]},
        {"id": "ams1", "name": "Amsterdam", "location": "Amsterdam", "country": "NL"},
        {"id": "fra2", "name": "Frankfurt", "location": "Frankfurt", "country": "DE", "code": "FRA2"}
    ]"#;

    #[test]
    fn test_incomplete_entries_are_skipped() {
        let pops = parse_json(INVENTORY).unwrap();

        let ids: Vec<&str> = pops.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["nrt57", "sfo5"], "Should keep mapped PoPs sorted by id");
    }

    #[test]
    fn test_codes_and_neighbors_are_lowercased() {
        let pops = parse_json(INVENTORY).unwrap();
        let nrt = pops.iter().find(|p| p.id == "nrt57").unwrap();

        assert_eq!(nrt.code, "nrt57");
        assert!(nrt.neighbors.contains("nrt20"));
        assert!(nrt.neighbors.contains("kix56"));
    }

    #[test]
    fn test_invalid_json_is_rejected() {
        assert!(parse_json("{not json").is_err());
    }

    #[test]
    fn test_yaml_inventory() {
        let yaml = r"
- id: nyc1
  location: New York
  country: US
  subnet: 1.2.3.0/24
  code: NYC1
";
        let pops = parse_yaml(yaml).unwrap();
        assert_eq!(pops.len(), 1);
        assert_eq!(pops[0].code, "nyc1");
        assert!(pops[0].neighbors.is_empty());
    }

    #[tokio::test]
    async fn test_load_pops_from_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        file.write_all(INVENTORY.as_bytes()).unwrap();

        let pops = load_pops(file.path()).await.unwrap();
        assert_eq!(pops.len(), 2);
    }

    #[tokio::test]
    async fn test_file_source_rereads_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        file.write_all(INVENTORY.as_bytes()).unwrap();
        let source = FilePopSource::new(file.path());

        assert_eq!(source.load().await.unwrap().len(), 2);

        std::fs::write(file.path(), "[]").unwrap();
        assert!(source.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_load_pops_missing_file() {
        let result = load_pops(std::path::Path::new("/nonexistent/pop.json")).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_shard_domains_partitions_by_index() {
        let domains: Vec<String> = ["a.com", "b.com", "c.com", "d.com", "e.com"]
            .iter()
            .map(ToString::to_string)
            .collect();

        assert_eq!(shard_domains(&domains, Some((0, 2))), vec!["a.com", "c.com", "e.com"]);
        assert_eq!(shard_domains(&domains, Some((1, 2))), vec!["b.com", "d.com"]);
        assert_eq!(shard_domains(&domains, None), domains);
    }

    #[test]
    fn test_shards_cover_every_domain_once() {
        let domains: Vec<String> = (0..17).map(|i| format!("d{i}.example.com")).collect();

        let mut all: Vec<String> = (0..4)
            .flat_map(|index| shard_domains(&domains, Some((index, 4))))
            .collect();
        all.sort();
        let mut expected = domains.clone();
        expected.sort();

        assert_eq!(all, expected);
    }

    #[test]
    fn test_pop_builder() {
        let pop = Pop::new("NYC", "1.2.3.0/24").with_neighbors(["EWR"]);
        assert_eq!(pop.code, "nyc");
        assert!(pop.neighbors.contains("ewr"));
    }
}
