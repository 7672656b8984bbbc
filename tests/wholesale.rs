//! Integration test for the wholesale fixture set.
//!
//! The cart, after merging and tier pricing:
//!
//! 1. Product 7, two lines of 4 and 2 with the same options, merged into one line of 6. The
//!    wholesale group's break at 5 prices it at £10.00 (table 1, layered over table 2), so the
//!    line is £60.00.
//! 2. Product 9, 1 x £30.00
//! 3. Gift box master (product 20), 1 x £15.00, and its free component (product 21)
//!
//! Subtotal: £105.00
//!
//! Rules:
//!
//! 1. Wholesale 10%: subtotal >= 50 and group 2, so £10.50 off the cart
//! 2. T-shirt 2.00 off: in-stock lines of product 7 only, 6 x £2.00 = £12.00 off that line.
//!    Product 7 is sold out in the catalog, but the medium red variant on the cart line is held,
//!    so the line's resolved record is in stock.
//! 3. Trade channel 5.00 off: the cart carries `channel: trade`, so £5.00 off the cart
//! 4. Retired summer sale: inactive, never evaluated
//!
//! Expected total discount: £27.50

use anyhow::Result;
use rust_decimal::Decimal;
use testresult::TestResult;

use pricewright::{
    cart::Cart,
    catalog::{CustomerGroupId, ProductId},
    conditions::{ConditionNode, cache::ConditionCache},
    context::Parameters,
    engine::{DiscountEngine, Evaluation, EvaluationReport, FailureKind, RuleId},
    fixtures::Fixture,
    settings::EngineSettings,
};

fn gbp(pence: i64) -> Decimal {
    Decimal::new(pence, 2)
}

/// Evaluate the fixture's rules with the catalog records of every line attached.
fn evaluate(
    fixture: &Fixture,
    cart: &Cart,
    parameters: &Parameters,
    settings: EngineSettings,
) -> Result<EvaluationReport> {
    let records = fixture.records(cart, &settings)?;
    let engine = DiscountEngine::with_builtins(settings)?;
    let evaluation = Evaluation::new(cart)
        .with_parameters(parameters)
        .with_records(&records);
    let mut cache = ConditionCache::new();

    Ok(engine.evaluate(fixture.rules(), &evaluation, fixture.conditions(), &mut cache))
}

#[test]
fn wholesale_cart_is_merged_and_tier_priced() -> TestResult {
    let fixture = Fixture::from_set("wholesale")?;
    let cart = fixture.cart()?;

    assert_eq!(cart.len(), 4);
    assert_eq!(cart.subtotal(), gbp(105_00));

    let (_, tshirts) = cart
        .iter()
        .find(|(_, line)| line.product_id() == ProductId(7))
        .ok_or("Expected the merged T-shirt line")?;

    assert_eq!(tshirts.quantity(), 6);
    assert_eq!(tshirts.unit_price(), gbp(10_00));

    Ok(())
}

#[test]
fn wholesale_rules_stack_their_discounts() -> TestResult {
    let fixture = Fixture::from_set("wholesale")?;
    let cart = fixture.cart()?;

    let report = evaluate(
        &fixture,
        &cart,
        &fixture.parameters()?,
        EngineSettings::load("fixtures/settings.yml")?,
    )?;

    assert!(report.failures().is_empty());
    assert!(report.applied());
    assert_eq!(report.cart_discount(), gbp(15_50));
    assert_eq!(report.discounts().total(), gbp(12_00));
    assert_eq!(report.total_discount(), gbp(27_50));

    let rules: Vec<(RuleId, bool, bool)> = report
        .outcomes()
        .iter()
        .map(|outcome| (outcome.rule_id, outcome.eligible, outcome.applied))
        .collect();

    assert_eq!(
        rules,
        vec![
            (RuleId(1), true, true),
            (RuleId(2), true, true),
            (RuleId(3), true, true)
        ]
    );

    Ok(())
}

#[test]
fn an_empty_cart_gets_nothing() -> TestResult {
    let fixture = Fixture::from_set("wholesale")?;
    let cart = Cart::new(fixture.currency()?).with_customer_group(CustomerGroupId(2));

    let report = evaluate(&fixture, &cart, &fixture.parameters()?, EngineSettings::default())?;

    assert!(report.failures().is_empty());
    assert!(!report.applied());
    assert_eq!(report.total_discount(), Decimal::ZERO);

    // The trade rule holds but has nothing to take its amount off.
    assert!(
        report
            .outcomes()
            .iter()
            .any(|outcome| outcome.rule_id == RuleId(3) && outcome.eligible && !outcome.applied)
    );

    Ok(())
}

#[test]
fn the_trade_rule_needs_the_channel_parameter() -> TestResult {
    let fixture = Fixture::from_set("wholesale")?;
    let cart = fixture.cart()?;

    let report = evaluate(&fixture, &cart, &Parameters::new(), EngineSettings::default())?;

    assert_eq!(report.total_discount(), gbp(22_50));
    assert!(
        report
            .outcomes()
            .iter()
            .any(|outcome| outcome.rule_id == RuleId(3) && !outcome.eligible)
    );

    Ok(())
}

#[test]
fn a_broken_condition_tree_fails_only_its_own_rule() -> TestResult {
    let mut fixture = Fixture::from_set("wholesale")?;

    fixture.push_condition(
        ConditionNode::leaf(22, 2, "no_such_condition")
            .child_of(20)
            .with_field("value", "1"),
    );

    let cart = fixture.cart()?;

    let report = evaluate(&fixture, &cart, &fixture.parameters()?, EngineSettings::default())?;

    let failure = report.failures().first().ok_or("Expected a failure")?;

    assert_eq!(report.failures().len(), 1);
    assert_eq!(failure.rule_id, RuleId(3));
    assert_eq!(failure.kind, FailureKind::Configuration);
    assert_eq!(report.total_discount(), gbp(22_50));

    Ok(())
}

#[test]
fn report_renders_every_line_and_rule() -> TestResult {
    let fixture = Fixture::from_set("wholesale")?;
    let cart = fixture.cart()?;

    let report = evaluate(&fixture, &cart, &fixture.parameters()?, EngineSettings::default())?;

    let mut out = Vec::new();

    report.write_to(&mut out, &cart)?;

    let rendered = String::from_utf8(out)?;

    assert!(rendered.contains("Wholesale 10%"));
    assert!(rendered.contains("Trade channel 5.00 off"));
    assert!(!rendered.contains("Retired summer sale"));
    assert!(rendered.contains("£27.50"));

    Ok(())
}

#[test]
fn lines_without_a_record_fail_the_stock_filter() -> TestResult {
    let fixture = Fixture::from_set("wholesale")?;
    let cart = fixture.cart()?;

    let engine = DiscountEngine::with_builtins(EngineSettings::default())?;
    let evaluation = Evaluation::new(&cart).with_parameters(&fixture.parameters()?);
    let mut cache = ConditionCache::new();

    let report = engine.evaluate(fixture.rules(), &evaluation, fixture.conditions(), &mut cache);

    assert_eq!(report.discounts().total(), Decimal::ZERO);
    assert_eq!(report.total_discount(), gbp(15_50));
    assert!(
        report
            .outcomes()
            .iter()
            .any(|outcome| outcome.rule_id == RuleId(2) && outcome.eligible && !outcome.applied)
    );

    Ok(())
}

#[test]
fn tshirt_line_resolves_through_its_variant() -> TestResult {
    let fixture = Fixture::from_set("wholesale")?;
    let cart = fixture.cart()?;
    let records = fixture.records(&cart, &EngineSettings::default())?;

    let (key, _) = cart
        .iter()
        .find(|(_, line)| line.product_id() == ProductId(7))
        .ok_or("Expected the merged T-shirt line")?;
    let record = records.get(&key).ok_or("Expected a record for the T-shirt line")?;

    assert!(record.in_stock);
    assert_eq!(record.price, gbp(12_50));
    assert_eq!(record.volume, Some(Decimal::new(4, 1)));
    assert_eq!(records.len(), 4);

    Ok(())
}
