//! Block ranking and context assembly on parsed sources.

use vibecode::core::BlockKind;
use vibecode::core::blocks::{assemble_context, context_text, rank_blocks};
use vibecode::parsers::PythonAnalyzer;

const SHOP: &str = r#"import json
from decimal import Decimal


def load_prices(path):
    """Read the price table from disk."""
    with open(path) as fh:
        return json.load(fh)


def apply_discount(price, rate):
    return price * (1 - rate)


@cache
def checkout_total(cart, path):
    """Sum the cart using current prices and the member discount."""
    prices = load_prices(path)
    subtotal = sum(Decimal(prices[item]) for item in cart)
    return apply_discount(subtotal, 0.1)


class Receipt:
    def render(self):
        return "receipt"
"#;

#[test]
fn name_in_query_outranks_content_matches() {
    let blocks = PythonAnalyzer::new().parse(SHOP).expect("parses");
    let ranked = rank_blocks(&blocks, "make checkout_total round the discount");

    assert_eq!(ranked[0].0.name, "checkout_total");
    assert!(ranked.iter().all(|(_, score)| *score > 0));
    assert!(ranked.iter().all(|(b, _)| b.name != "Receipt"));
}

#[test]
fn unrelated_query_ranks_nothing() {
    let blocks = PythonAnalyzer::new().parse(SHOP).expect("parses");
    assert!(rank_blocks(&blocks, "zzz qqq").is_empty());
}

#[test]
fn context_is_imports_target_then_callees() {
    let blocks = PythonAnalyzer::new().parse(SHOP).expect("parses");
    let target = blocks.iter().find(|b| b.name == "checkout_total").expect("target");

    let context = assemble_context(&blocks, target, 5);
    let names: Vec<&str> = context.iter().map(|b| b.name.as_str()).collect();
    assert_eq!(names, vec!["imports", "checkout_total", "apply_discount", "load_prices"]);

    let capped = assemble_context(&blocks, target, 3);
    assert_eq!(capped.len(), 3);
    assert_eq!(capped[2].name, "apply_discount");

    let text = context_text(&context);
    assert!(text.starts_with("import json\nfrom decimal import Decimal\n\n@cache\ndef checkout_total"));
}

#[test]
fn decorated_definition_spans_its_decorator() {
    let blocks = PythonAnalyzer::new().parse(SHOP).expect("parses");
    let target = blocks.iter().find(|b| b.name == "checkout_total").expect("target");

    assert_eq!(target.kind, BlockKind::Function);
    assert_eq!(target.start_line, 15);
    assert_eq!(target.end_line, 20);
    assert_eq!(
        target.docstring.as_deref(),
        Some("Sum the cart using current prices and the member discount.")
    );
    assert!(target.dependencies.contains("load_prices"));
    assert!(target.dependencies.contains("Decimal"));
}
