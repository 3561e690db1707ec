//! Tests for search and config subcommands.

use super::parse;
use crate::cli::{Cli, CliCommand};
use clap::Parser;
use std::path::Path;

#[test]
fn cli_parse_search() {
    match parse(&["romget", "search", "tetris", "--listing", "gb.txt"]) {
        CliCommand::Search { query, listing } => {
            assert_eq!(query, "tetris");
            assert_eq!(listing.listing, Path::new("gb.txt"));
            assert!(listing.base_url.is_none());
            assert!(listing.region.is_none());
            assert!(listing.extension.is_none());
        }
        _ => panic!("expected Search"),
    }
}

#[test]
fn cli_parse_search_filters() {
    match parse(&[
        "romget",
        "search",
        "zelda",
        "--listing",
        "gb.txt",
        "--base-url",
        "https://mirror.example/gb/",
        "--region",
        "USA",
        "--extension",
        "zip",
    ]) {
        CliCommand::Search { listing, .. } => {
            assert_eq!(listing.base_url.as_deref(), Some("https://mirror.example/gb/"));
            assert_eq!(listing.region.as_deref(), Some("USA"));
            assert_eq!(listing.extension.as_deref(), Some("zip"));
        }
        _ => panic!("expected Search with filters"),
    }
}

#[test]
fn cli_search_requires_listing() {
    assert!(Cli::try_parse_from(["romget", "search", "tetris"]).is_err());
}

#[test]
fn cli_base_url_conflicts_with_platform() {
    let res = Cli::try_parse_from([
        "romget",
        "search",
        "tetris",
        "--listing",
        "gb.txt",
        "--base-url",
        "http://a/",
        "--platform",
        "gb",
    ]);
    assert!(res.is_err());
}

#[test]
fn cli_parse_config() {
    assert!(matches!(parse(&["romget", "config"]), CliCommand::Config));
}
