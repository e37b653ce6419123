//! WebAssembly bindings for Redir
//!
//! Exposes rule derivation to the extension's background script. Results are
//! plain JS objects shaped like the declarative engine's rule fields.

use wasm_bindgen::prelude::*;

use redir_core::{
    default_local_rules as resolve_local_rules, derive_rule as derive, escape, namespace_of,
    normalize, rule_id as hash_rule_id, skip_reason, DynamicRule, LocalEndpoints, RedirectPair,
    RegexRule,
};

#[wasm_bindgen]
pub fn escape_url_regex(literal: &str) -> String {
    escape(literal)
}

#[wasm_bindgen]
pub fn normalize_scheme(pattern: &str) -> String {
    normalize(pattern)
}

#[wasm_bindgen]
pub fn url_namespace(url: &str) -> String {
    namespace_of(url)
}

/// Derive the rule for one observed redirect.
///
/// Returns `{ regexFilter, regexSubstitution, strategy, id }`.
#[wasm_bindgen]
pub fn derive_rule(origin_url: &str, redirect_url: &str) -> JsValue {
    let derived = derive(&RedirectPair::new(origin_url, redirect_url));
    let rule = &derived.rule;

    let js_result = js_sys::Object::new();
    let _ = js_sys::Reflect::set(&js_result, &"regexFilter".into(), &JsValue::from_str(&rule.pattern));
    let _ = js_sys::Reflect::set(
        &js_result,
        &"regexSubstitution".into(),
        &JsValue::from_str(&rule.substitution),
    );
    let _ = js_sys::Reflect::set(&js_result, &"strategy".into(), &JsValue::from_str(derived.strategy.name()));
    let _ = js_sys::Reflect::set(
        &js_result,
        &"id".into(),
        &JsValue::from(hash_rule_id(&rule.pattern, &rule.substitution, &[])),
    );
    js_result.into()
}

/// Full declarative rule for a pattern and substitution, ready for
/// `updateDynamicRules`.
#[wasm_bindgen]
pub fn dynamic_rule(pattern: &str, substitution: &str, excluded_initiator_domains: JsValue) -> JsValue {
    let excluded = string_array(&excluded_initiator_domains);
    let id = hash_rule_id(pattern, substitution, &excluded);
    rule_to_js(&DynamicRule::redirect(id, &RegexRule::new(pattern, substitution), excluded))
}

#[wasm_bindgen]
pub fn rule_id(pattern: &str, substitution: &str, excluded_initiator_domains: JsValue) -> u32 {
    hash_rule_id(pattern, substitution, &string_array(&excluded_initiator_domains))
}

/// Default loopback rules for the given endpoints, as declarative rules.
#[wasm_bindgen]
pub fn default_local_rules(gateway_url: &str, api_url: &str) -> JsValue {
    let endpoints = LocalEndpoints {
        gateway_url,
        api_url,
    };
    let local = resolve_local_rules(&endpoints);
    if local.len() < 3 {
        web_sys::console::warn_1(&JsValue::from_str(&format!(
            "redir: only {} default local rules for gateway {} and API {}",
            local.len(),
            gateway_url,
            api_url
        )));
    }

    let rules = js_sys::Array::new();
    for entry in local {
        let id = hash_rule_id(&entry.rule.pattern, &entry.rule.substitution, &[]);
        let rule = rule_to_js(&DynamicRule::redirect(id, &entry.rule, Vec::new()));
        rules.push(&rule);
    }
    rules.into()
}

/// Why a redirect must not get a rule, or `undefined` if it should.
#[wasm_bindgen]
pub fn skip_redirect(
    origin_url: &str,
    redirect_url: &str,
    gateway_url: &str,
    recovery_page_url: Option<String>,
) -> Option<String> {
    let pair = RedirectPair::new(origin_url, redirect_url);
    skip_reason(&pair, gateway_url, recovery_page_url.as_deref()).map(|reason| reason.name().to_string())
}

/// Rewrite `url` with a rule the way the declarative engine would.
#[wasm_bindgen]
pub fn apply_rule(pattern: &str, substitution: &str, url: &str) -> Result<Option<String>, JsValue> {
    RegexRule::new(pattern, substitution)
        .apply(url)
        .map_err(|e| JsValue::from_str(&format!("Invalid regexFilter: {}", e)))
}

// =============================================================================
// JS conversion
// =============================================================================

fn string_array(value: &JsValue) -> Vec<String> {
    if value.is_undefined() || value.is_null() {
        return Vec::new();
    }
    js_sys::Array::from(value)
        .iter()
        .filter_map(|item| item.as_string())
        .collect()
}

fn rule_to_js(rule: &DynamicRule) -> JsValue {
    let redirect = js_sys::Object::new();
    let _ = js_sys::Reflect::set(
        &redirect,
        &"regexSubstitution".into(),
        &JsValue::from_str(rule.substitution()),
    );

    let action = js_sys::Object::new();
    let _ = js_sys::Reflect::set(&action, &"type".into(), &JsValue::from_str("redirect"));
    let _ = js_sys::Reflect::set(&action, &"redirect".into(), &redirect);

    let resource_types = js_sys::Array::new();
    for name in rule.condition.resource_types.names() {
        resource_types.push(&JsValue::from_str(name));
    }

    let condition = js_sys::Object::new();
    let _ = js_sys::Reflect::set(&condition, &"regexFilter".into(), &JsValue::from_str(rule.pattern()));
    if !rule.condition.excluded_initiator_domains.is_empty() {
        let domains = js_sys::Array::new();
        for domain in &rule.condition.excluded_initiator_domains {
            domains.push(&JsValue::from_str(domain));
        }
        let _ = js_sys::Reflect::set(&condition, &"excludedInitiatorDomains".into(), &domains);
    }
    let _ = js_sys::Reflect::set(&condition, &"resourceTypes".into(), &resource_types);

    let js_result = js_sys::Object::new();
    let _ = js_sys::Reflect::set(&js_result, &"id".into(), &JsValue::from(rule.id));
    let _ = js_sys::Reflect::set(&js_result, &"priority".into(), &JsValue::from(rule.priority));
    let _ = js_sys::Reflect::set(&js_result, &"action".into(), &action);
    let _ = js_sys::Reflect::set(&js_result, &"condition".into(), &condition);
    js_result.into()
}

#[cfg(all(test, target_arch = "wasm32"))]
mod tests {
    use super::*;
    use wasm_bindgen_test::*;

    fn get(value: &JsValue, key: &str) -> JsValue {
        js_sys::Reflect::get(value, &key.into()).unwrap()
    }

    #[wasm_bindgen_test]
    fn derives_namespace_rule() {
        let rule = derive_rule("https://ipfs.io/ipfs/QmZMxU", "http://localhost:8080/ipfs/QmZMxU");
        assert_eq!(
            get(&rule, "regexFilter").as_string().unwrap(),
            "^https?\\://ipfs\\.io\\/(ipfs|ipns)\\/((?:[^\\.]|$).*)$"
        );
        assert_eq!(
            get(&rule, "regexSubstitution").as_string().unwrap(),
            "http://localhost:8080/\\1/\\2"
        );
        assert_eq!(get(&rule, "strategy").as_string().unwrap(), "namespace");
    }

    #[wasm_bindgen_test]
    fn builds_engine_rule_shape() {
        let rule = dynamic_rule("^a(.*)$", "b\\1", JsValue::UNDEFINED);
        assert_eq!(get(&rule, "priority").as_f64(), Some(1.0));
        let action = get(&rule, "action");
        assert_eq!(get(&action, "type").as_string().unwrap(), "redirect");
        let condition = get(&rule, "condition");
        assert!(get(&condition, "excludedInitiatorDomains").is_undefined());
        assert_eq!(js_sys::Array::from(&get(&condition, "resourceTypes")).length(), 15);
    }

    #[wasm_bindgen_test]
    fn lists_default_local_rules() {
        let rules = js_sys::Array::from(&default_local_rules(
            "http://localhost:8080",
            "http://127.0.0.1:5001",
        ));
        assert_eq!(rules.length(), 3);
    }

    #[wasm_bindgen_test]
    fn reports_skip_reason() {
        assert_eq!(
            skip_redirect(
                "http://127.0.0.1:8080/x",
                "http://localhost:8080/x",
                "http://localhost:8080",
                None
            ),
            Some("loopback".to_string())
        );
        assert_eq!(
            apply_rule("^a(.*)$", "b\\1", "axy").unwrap(),
            Some("bxy".to_string())
        );
    }
}
