//! Integration tests for tier price resolution against the wholesale tier tables.
//!
//! Table 2 holds the breaks as a legacy blob:
//!
//! - general: 5 and up at £11.00
//! - group 2: 5 and up at £10.00, 10 and up at £9.00
//!
//! Table 1 is layered over table 2 and reprices the same rows (£11.00, £10.00, £9.00).

use rust_decimal::Decimal;
use testresult::TestResult;

use pricewright::{
    catalog::CustomerGroupId,
    fixtures::Fixture,
    tiers::{TierBreak, TierTableId, cache::TierCache},
};

const WHOLESALE: CustomerGroupId = CustomerGroupId(2);
const LAYERED: TierTableId = TierTableId(1);
const BASE: TierTableId = TierTableId(2);

fn gbp(pence: i64) -> Decimal {
    Decimal::new(pence, 2)
}

#[test]
fn group_rows_take_precedence_over_general_rows() -> TestResult {
    let fixture = Fixture::from_set("wholesale")?;
    let mut cache = TierCache::new();

    let table = cache.table(fixture.tiers(), BASE);

    assert_eq!(table.resolve(None, 5, gbp(12_50)), gbp(11_00));
    assert_eq!(table.resolve(Some(WHOLESALE), 5, gbp(12_50)), gbp(10_00));
    assert_eq!(table.resolve(Some(WHOLESALE), 12, gbp(12_50)), gbp(9_00));
    assert_eq!(table.resolve(Some(CustomerGroupId(3)), 12, gbp(12_50)), gbp(11_00));

    Ok(())
}

#[test]
fn quantity_one_uses_the_default_price() -> TestResult {
    let fixture = Fixture::from_set("wholesale")?;
    let mut cache = TierCache::new();

    let table = cache.table(fixture.tiers(), LAYERED);

    assert_eq!(table.resolve(Some(WHOLESALE), 1, gbp(12_50)), gbp(12_50));
    assert_eq!(
        table.breaks(Some(WHOLESALE), gbp(12_50)).first(),
        Some(&TierBreak {
            quantity: 1,
            price: gbp(12_50)
        })
    );

    Ok(())
}

#[test]
fn prices_never_rise_with_quantity_for_any_group() -> TestResult {
    let fixture = Fixture::from_set("wholesale")?;
    let mut cache = TierCache::new();

    for id in [LAYERED, BASE] {
        let table = cache.table(fixture.tiers(), id);

        for group in [None, Some(WHOLESALE), Some(CustomerGroupId(9))] {
            let prices: Vec<Decimal> = (1..=20)
                .map(|quantity| table.resolve(group, quantity, gbp(12_50)))
                .collect();

            assert!(
                prices.windows(2).all(|pair| pair.first() >= pair.last()),
                "prices rose with quantity for table {id}, group {group:?}: {prices:?}"
            );
        }
    }

    Ok(())
}

#[test]
fn layered_table_lists_the_groups_of_its_parent_rows() -> TestResult {
    let fixture = Fixture::from_set("wholesale")?;
    let mut cache = TierCache::new();

    assert_eq!(cache.customer_groups(fixture.tiers(), LAYERED), &[WHOLESALE]);
    assert!(cache.contains(LAYERED));
    assert!(!cache.contains(BASE));

    Ok(())
}
