//! Integration tests for cart line identity and merging.

use rust_decimal::Decimal;
use rusty_money::iso::GBP;
use testresult::TestResult;

use pricewright::{
    cart::{
        BundleItemId, BundleLink, Cart, CartKey, LineItem,
        identity::LineFingerprint,
        merge::{CartLineMerger, MergeOutcome},
    },
    catalog::ProductId,
};

fn shirt(quantity: u32) -> LineItem {
    LineItem::new(ProductId(7), quantity, Decimal::new(1250, 2))
        .with_option("size", "M")
        .with_option("colour", "red")
        .with_extra("gift_wrap", true)
}

fn gift_box(key: &str) -> LineItem {
    LineItem::new(ProductId(20), 1, Decimal::new(1500, 2)).with_cart_key(CartKey::new(key))
}

fn component(master: &str, product: u64, quantity: u32) -> LineItem {
    LineItem::new(ProductId(product), quantity, Decimal::ZERO).as_component_of(BundleLink {
        master_cart_key: CartKey::new(master),
        master_item_id: BundleItemId(1),
        master_item_product_id: ProductId(product),
    })
}

#[test]
fn fingerprints_ignore_attribute_order_and_quantity() -> TestResult {
    let reordered = LineItem::new(ProductId(7), 9, Decimal::ONE)
        .with_extra("gift_wrap", true)
        .with_option("colour", "red")
        .with_option("size", "M");

    let a = LineFingerprint::of(&shirt(1), [])?;
    let b = LineFingerprint::of(&reordered, [])?;

    assert_eq!(a, b);
    assert_eq!(a.as_str().len(), 64);

    Ok(())
}

#[test]
fn fingerprints_differ_for_different_configurations() -> TestResult {
    let large = shirt(1).with_option("size", "L");

    assert_ne!(LineFingerprint::of(&shirt(1), [])?, LineFingerprint::of(&large, [])?);

    Ok(())
}

#[test]
fn identical_lines_merge_into_one() {
    let merger = CartLineMerger::new();
    let mut cart = Cart::new(GBP);

    let first = merger.add(&mut cart, shirt(2));
    let second = merger.add(&mut cart, shirt(3));

    assert!(matches!(first, MergeOutcome::Inserted(_)));
    assert_eq!(second, MergeOutcome::Merged(first.key()));
    assert_eq!(cart.len(), 1);
    assert_eq!(cart.quantity(), 5);
}

#[test]
fn merging_is_deterministic_for_the_same_sequence() {
    let merger = CartLineMerger::new();

    let build = || {
        let mut cart = Cart::new(GBP);

        for line in [shirt(1), shirt(1).with_option("size", "L"), shirt(2)] {
            merger.add(&mut cart, line);
        }

        let mut lines: Vec<(String, u32)> = cart
            .iter()
            .map(|(_, line)| {
                let size = line
                    .options()
                    .get("size")
                    .map(|value| format!("{value:?}"))
                    .unwrap_or_default();

                (size, line.quantity())
            })
            .collect();

        lines.sort();
        lines
    };

    let first = build();

    assert_eq!(first.len(), 2);
    assert_eq!(first, build());
}

#[test]
fn bundle_components_never_merge_as_top_level_lines() {
    let merger = CartLineMerger::new();
    let mut cart = Cart::new(GBP);

    merger.add(&mut cart, gift_box("box-1"));
    merger.add(&mut cart, component("box-1", 21, 1));

    let outcome = merger.add(&mut cart, component("box-1", 21, 1));

    assert!(matches!(outcome, MergeOutcome::Inserted(_)));
    assert_eq!(cart.len(), 3);
}

#[test]
fn bundles_with_the_same_composition_merge_and_fold_their_components() {
    let merger = CartLineMerger::new();
    let mut cart = Cart::new(GBP);

    let first = merger.add(&mut cart, gift_box("box-1"));

    merger.add(&mut cart, component("box-1", 21, 1));

    // The second box's component is in the cart before its master arrives.
    merger.add(&mut cart, component("box-2", 21, 1));

    let second = merger.add(&mut cart, gift_box("box-2"));

    assert_eq!(second, MergeOutcome::Merged(first.key()));

    let components: Vec<u32> = cart
        .components_of(&CartKey::new("box-1"))
        .map(|(_, line)| line.quantity())
        .collect();

    assert_eq!(components, vec![2]);
    assert_eq!(cart.components_of(&CartKey::new("box-2")).count(), 0);
}

#[test]
fn bundles_with_different_compositions_stay_apart() {
    let merger = CartLineMerger::new();
    let mut cart = Cart::new(GBP);

    merger.add(&mut cart, gift_box("box-1"));
    merger.add(&mut cart, component("box-1", 21, 1));
    merger.add(&mut cart, component("box-2", 22, 1));

    let outcome = merger.add(&mut cart, gift_box("box-2"));

    assert!(matches!(outcome, MergeOutcome::Inserted(_)));
}
