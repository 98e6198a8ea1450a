pub mod ingress;
pub mod rules;
pub mod tenants;
