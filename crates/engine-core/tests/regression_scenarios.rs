// crates/engine-core/tests/regression_scenarios.rs
use std::collections::HashMap;

use engine_core::{apply_command, Event, EventKind, LevelBook};
use engine_protocol::csv_codec::{format_published, parse_input_line};

/// Drive books from driver-format lines and return every event as a
/// published CSV line. `seq` counts commands across all symbols here,
/// which is enough for single-symbol scenarios.
fn run(input: &str) -> (Vec<String>, HashMap<String, LevelBook>) {
    let mut books: HashMap<String, LevelBook> = HashMap::new();
    let mut lines = Vec::new();
    let mut seq = 0u64;

    for raw_line in input.lines() {
        let Some((symbol, cmd)) = parse_input_line(raw_line).expect("scenario line must parse")
        else {
            continue;
        };
        seq += 1;

        let book = books.entry(symbol.clone()).or_default();
        let mut kinds: Vec<EventKind> = Vec::new();
        apply_command(book, &cmd, &mut kinds);

        for (idx, kind) in kinds.into_iter().enumerate() {
            let ev = Event::new(seq, idx as u16, cmd.req_id, kind);
            lines.push(format_published(&symbol, &ev));
        }
    }

    (lines, books)
}

#[test]
fn full_cross_leaves_empty_book() {
    let (lines, mut books) = run(
        "#name: full cross\n\
         N, BTC, 1, 1, 100, B, 100, 10\n\
         N, BTC, 2, 2, 200, S, 100, 10\n",
    );

    assert_eq!(
        lines,
        vec![
            "BTC, A, 1, 0, 1, 1, 100",
            "BTC, D, 1, 1, 1, 1, 100",
            "BTC, A, 2, 0, 2, 2, 200",
            "BTC, T, 2, 1, 2, 1, 2, 100, 10",
        ]
    );
    let book = books.get_mut("BTC").unwrap();
    assert!(book.is_empty());
    assert_eq!(book.best_bid(), None);
    assert_eq!(book.best_ask(), None);
}

#[test]
fn sweep_two_levels_in_price_order() {
    let (lines, mut books) = run(
        "N, BTC, 1, 1, 100, S, 100, 1\n\
         N, BTC, 2, 2, 100, S, 101, 1\n\
         N, BTC, 3, 3, 300, B, 101, 2\n",
    );

    let trades: Vec<&String> = lines.iter().filter(|l| l.starts_with("BTC, T,")).collect();
    assert_eq!(
        trades,
        vec!["BTC, T, 3, 1, 3, 1, 3, 100, 1", "BTC, T, 3, 2, 3, 2, 3, 101, 1"]
    );
    // No Added for a fully filled taker.
    assert!(!lines.iter().any(|l| l.starts_with("BTC, D, 3,")));
    assert!(books.get_mut("BTC").unwrap().is_empty());
}

#[test]
fn cancelled_order_does_not_match() {
    let (lines, mut books) = run(
        "N, BTC, 1, 1, 100, S, 100, 1\n\
         C, BTC, 2, 1\n\
         N, BTC, 3, 2, 200, B, 100, 1\n",
    );

    assert!(lines.contains(&"BTC, X, 2, 0, 2, 1".to_string()));
    assert!(!lines.iter().any(|l| l.contains(", T,")));
    assert_eq!(lines.last().map(String::as_str), Some("BTC, D, 3, 1, 3, 2, 200"));

    let book = books.get_mut("BTC").unwrap();
    assert_eq!(book.best_bid(), Some(100));
    assert_eq!(book.best_ask(), None);
}

#[test]
fn cancel_twice_succeeds_once() {
    let (lines, _) = run(
        "N, ETH, 1, 7, 1, B, 50, 1\n\
         C, ETH, 2, 7\n\
         C, ETH, 3, 7\n",
    );
    assert_eq!(lines[2], "ETH, X, 2, 0, 2, 7");
    // Rejected(OrderNotFound): reason code 3, exactly one event.
    assert_eq!(&lines[3..], &["ETH, R, 3, 0, 3, 7, 0, 3".to_string()]);
}

#[test]
fn symbols_are_independent() {
    let (lines, books) = run(
        "N, BTC, 1, 1, 1, S, 100, 1\n\
         N, ETH, 2, 2, 2, B, 100, 1\n",
    );
    assert!(!lines.iter().any(|l| l.contains(", T,")));
    assert_eq!(books.len(), 2);
    assert_eq!(books["BTC"].len(), 1);
    assert_eq!(books["ETH"].len(), 1);
}
