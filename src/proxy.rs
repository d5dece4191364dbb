//! # Proxy Router
//!
//! An instance file talks to the map it is placed in through two kinds of
//! declaration entities, both removed once read:
//!
//! - `func_instance_parms`: `parmN` keys declaring `"name [type [default]]"`.
//! - `func_instance_io_proxy`: `OnProxyRelay` outputs on the proxy are the
//!   instance's inputs; outputs elsewhere that send `ProxyRelay` to the proxy
//!   are the instance's outputs.

use std::collections::{HashMap, HashSet};

use crate::document::Document;
use crate::output::Output;
use crate::schema::ValueType;

pub const PARMS_CLASS: &str = "func_instance_parms";
pub const PROXY_CLASS: &str = "func_instance_io_proxy";
pub const PARM_KEY_PREFIX: &str = "parm";
pub const RELAY_IN: &str = "OnProxyRelay";
pub const RELAY_OUT: &str = "ProxyRelay";

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDeclaration {
    pub name: String,
    pub declared_type: ValueType,
    pub default: String,
}

impl ParameterDeclaration {
    /// `"name [type [default]]"`. The default keeps any embedded spaces.
    pub fn parse(text: &str) -> ParameterDeclaration {
        let mut parts = text.splitn(3, ' ');
        let name = parts.next().unwrap_or_default().to_string();
        let declared_type = parts
            .next()
            .and_then(|tag| tag.parse().ok())
            .unwrap_or(ValueType::String);
        let default = parts.next().unwrap_or_default().to_string();
        ParameterDeclaration {
            name,
            declared_type,
            default,
        }
    }
}

/// `(name_lc, action_lc)`.
pub type ProxyKey = (String, String);

/// A parsed instance file with its boundary tables extracted.
#[derive(Debug, Clone)]
pub struct RoutedSubDocument {
    pub tree: Document,
    /// Keyed by lowercase name without the `$`.
    pub parameters: HashMap<String, ParameterDeclaration>,
    /// `(internal target, input)` → the relay that forwards it.
    pub proxy_inputs: HashMap<ProxyKey, Output>,
    /// `(source entity name, output)` → source entity id and the declared reaction.
    pub proxy_outputs: HashMap<ProxyKey, (u32, Output)>,
}

impl RoutedSubDocument {
    pub fn route(mut tree: Document) -> RoutedSubDocument {
        let mut parameters = HashMap::new();
        for handle in tree.by_class(PARMS_CLASS) {
            let Some(parms) = tree.remove_entity(handle) else {
                continue;
            };
            for (key, value) in parms.keys.iter() {
                if !key.to_lowercase().starts_with(PARM_KEY_PREFIX) {
                    continue;
                }
                let decl = ParameterDeclaration::parse(value);
                parameters.insert(decl.name.trim_start_matches('$').to_lowercase(), decl);
            }
        }

        let mut proxy_inputs = HashMap::new();
        let mut proxy_names = HashSet::new();
        for handle in tree.by_class(PROXY_CLASS) {
            let Some(proxy) = tree.remove_entity(handle) else {
                continue;
            };
            proxy_names.insert(proxy.targetname().to_lowercase());
            for mut out in proxy.outputs {
                if out.output.eq_ignore_ascii_case(RELAY_IN) {
                    out.output.clear();
                    proxy_inputs.insert((out.target.to_lowercase(), out.input.to_lowercase()), out);
                }
            }
        }

        let mut proxy_outputs = HashMap::new();
        for ent in tree.entities_mut() {
            let name = ent.targetname().to_lowercase();
            let id = ent.id;
            let (relayed, kept): (Vec<Output>, Vec<Output>) =
                std::mem::take(&mut ent.outputs).into_iter().partition(|out| {
                    out.input.eq_ignore_ascii_case(RELAY_OUT)
                        && proxy_names.contains(&out.target.to_lowercase())
                });
            ent.outputs = kept;
            for mut out in relayed {
                out.target.clear();
                out.input.clear();
                proxy_outputs.insert((name.clone(), out.output.to_lowercase()), (id, out));
            }
        }
        tree.compact();

        log::debug!(
            "Routed instance: {} parameters, {} inputs, {} outputs",
            parameters.len(),
            proxy_inputs.len(),
            proxy_outputs.len()
        );
        RoutedSubDocument {
            tree,
            parameters,
            proxy_inputs,
            proxy_outputs,
        }
    }

    /// Declared default for `$name`, if the file declares one.
    pub fn default_for(&self, name: &str) -> Option<&str> {
        self.parameters
            .get(&name.trim_start_matches('$').to_lowercase())
            .map(|p| p.default.as_str())
    }
}
