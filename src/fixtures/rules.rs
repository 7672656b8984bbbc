//! Rule Fixtures

use serde::Deserialize;

use crate::{conditions::ConditionNode, engine::Rule};

/// Wrapper for rules and the condition nodes they point at
#[derive(Debug, Deserialize)]
pub struct RulesFixture {
    /// Stored condition nodes, across every rule set
    #[serde(default)]
    pub conditions: Vec<ConditionNode>,

    /// Rules in evaluation order
    pub rules: Vec<Rule>,
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use crate::conditions::{ConditionRef, ConditionType};

    use super::*;

    #[test]
    fn rules_fixture_reads_conditions_and_actions() -> TestResult {
        let fixture: RulesFixture = serde_norway::from_str(
            "conditions:\n\
             \x20 - {id: 1, rule_set_id: 1, host_id: 1, class: all_of, type: ANY}\n\
             \x20 - {id: 2, pid: 1, rule_set_id: 1, class: cart_subtotal, fields: {amount: 50}}\n\
             rules:\n\
             \x20 - id: 1\n\
             \x20   name: Ten off\n\
             \x20   conditions: {rule_set_id: 1, host_id: 1}\n\
             \x20   action: {class: cart_fixed_amount, fields: {amount: 10}}\n",
        )?;

        assert_eq!(fixture.conditions.len(), 2);
        assert_eq!(
            fixture.conditions.first().map(|node| node.condition_type),
            Some(ConditionType::Any)
        );

        let rule = fixture.rules.first().ok_or("Expected a rule")?;

        assert!(rule.active);
        assert_eq!(rule.conditions, Some(ConditionRef::new(1, 1)));
        assert_eq!(rule.action.class_name, "cart_fixed_amount");

        Ok(())
    }
}
