//! Evaluation Report

use std::io;

use rust_decimal::Decimal;
use rusty_money::{Money, iso::Currency};
use tabled::{
    builder::Builder,
    settings::{
        Alignment, Color, Style,
        object::{Columns, Rows},
    },
};
use thiserror::Error;

use crate::{
    actions::DiscountMaps,
    cart::Cart,
    engine::{RuleFailure, RuleId},
};

/// Errors raised while rendering a report.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Output could not be written.
    #[error("IO error")]
    IO,
}

/// What one rule did during an evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleOutcome {
    /// Rule
    pub rule_id: RuleId,

    /// Rule name
    pub name: String,

    /// Whether the rule's conditions held
    pub eligible: bool,

    /// Whether the rule's action changed anything
    pub applied: bool,

    /// Scalar cart discount the rule contributed
    pub cart_discount: Decimal,

    /// Sum of the line discounts the rule contributed
    pub line_discount: Decimal,
}

impl RuleOutcome {
    pub(crate) fn ineligible(rule_id: RuleId, name: &str) -> Self {
        Self {
            rule_id,
            name: name.to_string(),
            eligible: false,
            applied: false,
            cart_discount: Decimal::ZERO,
            line_discount: Decimal::ZERO,
        }
    }
}

/// Result of evaluating a set of rules against a cart.
#[derive(Debug, Default)]
pub struct EvaluationReport {
    discounts: DiscountMaps,
    cart_discount: Decimal,
    applied: bool,
    outcomes: Vec<RuleOutcome>,
    failures: Vec<RuleFailure>,
}

impl EvaluationReport {
    pub(crate) fn record(&mut self, outcome: RuleOutcome, discounts: &DiscountMaps) {
        self.discounts.merge(discounts);
        self.cart_discount += outcome.cart_discount;
        self.applied |= outcome.applied;
        self.outcomes.push(outcome);
    }

    pub(crate) fn fail(&mut self, failure: RuleFailure) {
        self.failures.push(failure);
    }

    pub(crate) fn cap(&mut self, cart: &Cart) {
        self.discounts.clamp_to_lines(cart);

        let headroom = (cart.subtotal() - self.discounts.total()).max(Decimal::ZERO);

        self.cart_discount = self.cart_discount.min(headroom);
    }

    /// Per-line discounts of every applied rule.
    pub fn discounts(&self) -> &DiscountMaps {
        &self.discounts
    }

    /// Sum of the scalar cart discounts of every applied rule.
    pub fn cart_discount(&self) -> Decimal {
        self.cart_discount
    }

    /// Whether any action changed anything.
    pub fn applied(&self) -> bool {
        self.applied
    }

    /// Outcome of every rule that was evaluated without failing, in rule order.
    pub fn outcomes(&self) -> &[RuleOutcome] {
        &self.outcomes
    }

    /// Rules that failed.
    pub fn failures(&self) -> &[RuleFailure] {
        &self.failures
    }

    /// Cart discount plus every line discount.
    pub fn total_discount(&self) -> Decimal {
        self.cart_discount + self.discounts.total()
    }

    /// Print line discounts, rule outcomes and failures as tables.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::IO`] if the output cannot be written.
    pub fn write_to(&self, mut out: impl io::Write, cart: &Cart) -> Result<(), ReportError> {
        let currency = cart.currency();
        let mut lines = Builder::default();

        lines.push_record(["Product", "Qty", "Unit Price", "Total", "Discount"]);

        for (key, line) in cart.iter() {
            lines.push_record([
                line.product_id().to_string(),
                line.quantity().to_string(),
                money(line.unit_price(), currency),
                money(line.total(), currency),
                money(self.discounts.line(key), currency),
            ]);
        }

        let mut lines = lines.build();

        lines.with(Style::modern_rounded());
        lines.modify(Rows::first(), Color::BOLD);
        lines.modify(Columns::new(1..5), Alignment::right());

        writeln!(out, "\n{lines}").map_err(|_err| ReportError::IO)?;

        let mut rules = Builder::default();

        rules.push_record(["Rule", "Name", "Eligible", "Applied", "Discount"]);

        for outcome in &self.outcomes {
            rules.push_record([
                outcome.rule_id.to_string(),
                outcome.name.clone(),
                yes_no(outcome.eligible).to_string(),
                yes_no(outcome.applied).to_string(),
                money(outcome.cart_discount + outcome.line_discount, currency),
            ]);
        }

        let mut rules = rules.build();

        rules.with(Style::modern_rounded());
        rules.modify(Rows::first(), Color::BOLD);
        rules.modify(Columns::last(), Alignment::right());

        writeln!(out, "{rules}").map_err(|_err| ReportError::IO)?;

        for failure in &self.failures {
            writeln!(
                out,
                " Rule {} failed ({:?}): {}",
                failure.rule_id, failure.kind, failure.error
            )
            .map_err(|_err| ReportError::IO)?;
        }

        writeln!(
            out,
            " Cart discount: {}\n Total discount: {}",
            money(self.cart_discount, currency),
            money(self.total_discount(), currency)
        )
        .map_err(|_err| ReportError::IO)
    }
}

fn money(amount: Decimal, currency: &'static Currency) -> String {
    Money::from_decimal(amount, currency).to_string()
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
