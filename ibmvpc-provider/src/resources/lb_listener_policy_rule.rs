//! Load balancer listener policy rules
//!
//! A load balancer accepts one configuration change at a time and reports
//! `update_pending` while applying it. Every mutation therefore holds the
//! load balancer's lock, waits for it to be `active`, applies the change,
//! waits for the rule, and waits for the load balancer to settle again.

use std::time::Duration;

use ibmvpc_core::lock::KeyedGuard;
use ibmvpc_core::provider::{ProviderError, ProviderResult};
use ibmvpc_core::resource::{CompoundId, Resource, ResourceId, State, Value, join_id};
use log::info;

use crate::client::RulePath;
use crate::convert::load_balancer_listener_policy_rule_to_map;
use crate::error::NotFoundExt;
use crate::models::{
    LoadBalancerListenerPolicyRule, LoadBalancerListenerPolicyRulePatch,
    LoadBalancerListenerPolicyRulePrototype,
};
use crate::provider::{IbmVpcProvider, carry_over, changed, optional_string, required_str};
use crate::resources::RULE_TYPES_WITH_FIELD;
use crate::waiters;

const ID_PARTS: [&str; 4] = ["lb", "listener", "policy", "rule"];

fn check_field(resource: &Resource) -> ProviderResult<()> {
    let rule_type = required_str(resource, "type")?;
    if RULE_TYPES_WITH_FIELD.contains(&rule_type) && resource.get_str("field").is_none() {
        return Err(ProviderError::new(format!(
            "'field' is required for {} rules",
            rule_type
        )));
    }
    Ok(())
}

fn rule_state(id: ResourceId, path: &RulePath<'_>, rule: &LoadBalancerListenerPolicyRule) -> State {
    let mut attributes = load_balancer_listener_policy_rule_to_map(rule);
    for (key, value) in [
        ("lb", path.load_balancer_id),
        ("listener", path.listener_id),
        ("policy", path.policy_id),
    ] {
        attributes.insert(key.to_string(), Value::String(value.to_string()));
    }
    State::existing(id, attributes).with_identifier(join_id(&[
        path.load_balancer_id,
        path.listener_id,
        path.policy_id,
        &rule.id,
    ]))
}

impl IbmVpcProvider {
    /// Take the load balancer's lock and wait until it accepts changes
    async fn lock_active_load_balancer(
        &self,
        lb_id: &str,
        timeout: Duration,
    ) -> ProviderResult<KeyedGuard> {
        let guard = self.locks.lock(lb_id).await;
        waiters::load_balancer_available(&self.client, &self.poll, guard.key(), timeout).await?;
        Ok(guard)
    }

    pub(crate) async fn read_lb_listener_policy_rule(
        &self,
        id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<State> {
        let [lb_id, listener_id, policy_id, rule_id] = CompoundId::split(identifier, ID_PARTS)?;
        let path = RulePath {
            load_balancer_id: &lb_id,
            listener_id: &listener_id,
            policy_id: &policy_id,
            rule_id: &rule_id,
        };
        let rule = self
            .client
            .get_load_balancer_listener_policy_rule(&path)
            .await
            .optional()
            .map_err(|e| {
                e.context(format!(
                    "Error getting load balancer listener policy rule ({})",
                    identifier
                ))
            })?;

        Ok(match rule {
            Some(rule) => rule_state(id.clone(), &path, &rule),
            None => State::not_found(id.clone()),
        })
    }

    pub(crate) async fn create_lb_listener_policy_rule(
        &self,
        resource: &Resource,
    ) -> ProviderResult<State> {
        check_field(resource)?;
        let lb_id = required_str(resource, "lb")?;
        let collection = RulePath {
            load_balancer_id: lb_id,
            listener_id: required_str(resource, "listener")?,
            policy_id: required_str(resource, "policy")?,
            rule_id: "",
        };
        let prototype = LoadBalancerListenerPolicyRulePrototype {
            condition: required_str(resource, "condition")?.to_string(),
            rule_type: required_str(resource, "type")?.to_string(),
            value: required_str(resource, "value")?.to_string(),
            field: optional_string(resource, "field"),
        };
        let timeout = self.timeouts_for(resource).create;

        let _guard = self.lock_active_load_balancer(lb_id, timeout).await?;
        let created = self
            .client
            .create_load_balancer_listener_policy_rule(&collection, &prototype)
            .await
            .map_err(|e| {
                e.context(format!(
                    "Error creating rule on load balancer ({}) listener ({}) policy ({})",
                    lb_id, collection.listener_id, collection.policy_id
                ))
            })?;
        info!(
            "Created rule ({}) on load balancer ({}) policy ({})",
            created.id, lb_id, collection.policy_id
        );

        let path = RulePath {
            rule_id: &created.id,
            ..collection
        };
        let rule = waiters::load_balancer_listener_policy_rule_available(
            &self.client,
            &self.poll,
            &path,
            timeout,
        )
        .await?;
        waiters::load_balancer_available(&self.client, &self.poll, lb_id, timeout).await?;

        let mut state = rule_state(resource.id.clone(), &path, &rule);
        carry_over(&mut state.attributes, resource, &[]);
        Ok(state)
    }

    pub(crate) async fn update_lb_listener_policy_rule(
        &self,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<State> {
        let [lb_id, listener_id, policy_id, rule_id] = CompoundId::split(identifier, ID_PARTS)?;
        check_field(to)?;
        let path = RulePath {
            load_balancer_id: &lb_id,
            listener_id: &listener_id,
            policy_id: &policy_id,
            rule_id: &rule_id,
        };

        let mut patch = LoadBalancerListenerPolicyRulePatch::default();
        if changed(from, to, "condition") {
            patch.condition = optional_string(to, "condition");
        }
        if changed(from, to, "type") {
            patch.rule_type = optional_string(to, "type");
        }
        if changed(from, to, "value") {
            patch.value = optional_string(to, "value");
        }
        if changed(from, to, "field") {
            patch.field = optional_string(to, "field");
        }

        let rule = if patch.is_empty() {
            self.client
                .get_load_balancer_listener_policy_rule(&path)
                .await
                .map_err(|e| {
                    e.context(format!(
                        "Error getting load balancer listener policy rule ({})",
                        identifier
                    ))
                })?
        } else {
            let timeout = self.timeouts_for(to).update;
            let _guard = self.lock_active_load_balancer(&lb_id, timeout).await?;
            self.client
                .update_load_balancer_listener_policy_rule(&path, &patch)
                .await
                .map_err(|e| {
                    e.context(format!(
                        "Error updating load balancer listener policy rule ({})",
                        identifier
                    ))
                })?;
            let rule = waiters::load_balancer_listener_policy_rule_available(
                &self.client,
                &self.poll,
                &path,
                timeout,
            )
            .await?;
            waiters::load_balancer_available(&self.client, &self.poll, &lb_id, timeout).await?;
            rule
        };

        let mut state = rule_state(to.id.clone(), &path, &rule);
        carry_over(&mut state.attributes, to, &[]);
        Ok(state)
    }

    pub(crate) async fn delete_lb_listener_policy_rule(
        &self,
        identifier: &str,
        resource: &Resource,
    ) -> ProviderResult<()> {
        let [lb_id, listener_id, policy_id, rule_id] = CompoundId::split(identifier, ID_PARTS)?;
        let path = RulePath {
            load_balancer_id: &lb_id,
            listener_id: &listener_id,
            policy_id: &policy_id,
            rule_id: &rule_id,
        };
        let timeout = self.timeouts_for(resource).delete;

        let _guard = self.lock_active_load_balancer(&lb_id, timeout).await?;
        let deleted = self
            .client
            .delete_load_balancer_listener_policy_rule(&path)
            .await
            .optional()
            .map_err(|e| {
                e.context(format!(
                    "Error deleting load balancer listener policy rule ({})",
                    identifier
                ))
            })?;
        if deleted.is_none() {
            info!("Load balancer listener policy rule ({}) is already gone", identifier);
            return Ok(());
        }

        waiters::load_balancer_listener_policy_rule_deleted(&self.client, &self.poll, &path, timeout)
            .await?;
        waiters::load_balancer_available(&self.client, &self.poll, &lb_id, timeout).await?;
        Ok(())
    }
}
