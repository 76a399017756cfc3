//! Static role to permission catalog.
//!
//! Built once at startup and shared read-only (`Arc<PermissionCatalog>`).

use std::collections::{BTreeSet, HashMap};

pub mod roles {
    pub const ADMIN: &str = "Admin";
    pub const CUSTOMER: &str = "Customer";
    pub const MECHANIC: &str = "Mechanic";
    pub const VENDOR: &str = "Vendor";
    pub const MARKETER: &str = "Marketer";
    pub const FINANCE: &str = "Finance";
    pub const CUSTOMER_SUPPORT: &str = "CustomerSupport";
    pub const DELIVERY: &str = "Delivery";
    pub const DELIVERY_MANAGER: &str = "DeliveryManager";

    pub const ALL: [&str; 9] = [
        ADMIN,
        CUSTOMER,
        MECHANIC,
        VENDOR,
        MARKETER,
        FINANCE,
        CUSTOMER_SUPPORT,
        DELIVERY,
        DELIVERY_MANAGER,
    ];
}

pub mod permissions {
    // Users
    pub const USERS_READ: &str = "users.read";
    pub const USERS_CREATE: &str = "users.create";
    pub const USERS_UPDATE: &str = "users.update";
    pub const USERS_DELETE: &str = "users.delete";
    pub const USERS_MANAGE: &str = "users.manage";
    // Roles and permissions
    pub const ROLES_READ: &str = "roles.read";
    pub const ROLES_CREATE: &str = "roles.create";
    pub const ROLES_UPDATE: &str = "roles.update";
    pub const ROLES_DELETE: &str = "roles.delete";
    pub const ROLES_ASSIGN: &str = "roles.assign";
    pub const PERMISSIONS_READ: &str = "permissions.read";
    pub const PERMISSIONS_ASSIGN: &str = "permissions.assign";
    // Catalog
    pub const PARTS_READ: &str = "parts.read";
    pub const PARTS_CREATE: &str = "parts.create";
    pub const PARTS_UPDATE: &str = "parts.update";
    pub const PARTS_DELETE: &str = "parts.delete";
    pub const PARTS_APPROVE: &str = "parts.approve";
    pub const PARTS_MANAGE: &str = "parts.manage";
    pub const INVENTORY_READ: &str = "inventory.read";
    pub const INVENTORY_UPDATE: &str = "inventory.update";
    pub const INVENTORY_MANAGE: &str = "inventory.manage";
    // Orders
    pub const ORDERS_READ: &str = "orders.read";
    pub const ORDERS_CREATE: &str = "orders.create";
    pub const ORDERS_UPDATE: &str = "orders.update";
    pub const ORDERS_DELETE: &str = "orders.delete";
    pub const ORDERS_PROCESS: &str = "orders.process";
    pub const ORDERS_MANAGE: &str = "orders.manage";
    pub const ORDERS_ASSIGN: &str = "orders.assign";
    // Marketing
    pub const MARKETING_READ: &str = "marketing.read";
    pub const MARKETING_CREATE: &str = "marketing.create";
    pub const MARKETING_UPDATE: &str = "marketing.update";
    pub const MARKETING_DELETE: &str = "marketing.delete";
    pub const DISCOUNTS_MANAGE: &str = "discounts.manage";
    pub const FEATURED_ITEMS_MANAGE: &str = "featured-items.manage";
    pub const CAMPAIGNS_MANAGE: &str = "campaigns.manage";
    // Finance
    pub const FINANCE_READ: &str = "finance.read";
    pub const FINANCE_REPORTS: &str = "finance.reports";
    pub const ACCOUNTS_PAYABLE: &str = "accounts.payable";
    pub const ACCOUNTS_RECEIVABLE: &str = "accounts.receivable";
    pub const PAYMENTS_MANAGE: &str = "payments.manage";
    pub const INVOICES_MANAGE: &str = "invoices.manage";
    pub const REFUNDS_MANAGE: &str = "refunds.manage";
    // Support
    pub const SUPPORT_READ: &str = "support.read";
    pub const SUPPORT_CREATE: &str = "support.create";
    pub const SUPPORT_UPDATE: &str = "support.update";
    pub const SUPPORT_MANAGE: &str = "support.manage";
    pub const TICKETS_MANAGE: &str = "tickets.manage";
    pub const CUSTOMER_INTERACT: &str = "customer.interact";
    pub const COMPLAINTS_HANDLE: &str = "complaints.handle";
    pub const ORDERS_ON_BEHALF: &str = "orders.on-behalf";
    // Delivery
    pub const DELIVERY_READ: &str = "delivery.read";
    pub const DELIVERY_UPDATE: &str = "delivery.update";
    pub const DELIVERY_ASSIGN: &str = "delivery.assign";
    pub const DELIVERY_MANAGE: &str = "delivery.manage";
    pub const LOGISTICS_MANAGE: &str = "logistics.manage";
    pub const DELIVERY_TRACKING: &str = "delivery.tracking";
    pub const ROUTE_OPTIMIZATION: &str = "route.optimization";
    // Vendors and affiliates
    pub const VENDORS_READ: &str = "vendors.read";
    pub const VENDORS_MANAGE: &str = "vendors.manage";
    pub const VENDOR_ONBOARDING: &str = "vendor.onboarding";
    pub const VENDOR_PAYMENTS: &str = "vendor.payments";
    pub const AFFILIATE_READ: &str = "affiliate.read";
    pub const AFFILIATE_MANAGE: &str = "affiliate.manage";
    pub const COMMISSIONS_MANAGE: &str = "commissions.manage";
    // Reporting
    pub const REPORTS_READ: &str = "reports.read";
    pub const REPORTS_EXPORT: &str = "reports.export";
    pub const ANALYTICS_READ: &str = "analytics.read";
    pub const DASHBOARD_ACCESS: &str = "dashboard.access";
    // System
    pub const SYSTEM_READ: &str = "system.read";
    pub const SYSTEM_UPDATE: &str = "system.update";
    pub const SYSTEM_MANAGE: &str = "system.manage";
    pub const AUDIT_LOGS_READ: &str = "audit-logs.read";
}

use permissions as p;

#[rustfmt::skip]
fn default_grants() -> Vec<(&'static str, Vec<&'static str>)> {
    vec![
        (
            roles::ADMIN,
            vec![
                p::USERS_READ, p::USERS_CREATE, p::USERS_UPDATE, p::USERS_DELETE, p::USERS_MANAGE,
                p::ROLES_READ, p::ROLES_CREATE, p::ROLES_UPDATE, p::ROLES_DELETE, p::ROLES_ASSIGN,
                p::PERMISSIONS_READ, p::PERMISSIONS_ASSIGN,
                p::PARTS_READ, p::PARTS_CREATE, p::PARTS_UPDATE, p::PARTS_DELETE, p::PARTS_APPROVE,
                p::PARTS_MANAGE,
                p::INVENTORY_READ, p::INVENTORY_UPDATE, p::INVENTORY_MANAGE,
                p::ORDERS_READ, p::ORDERS_CREATE, p::ORDERS_UPDATE, p::ORDERS_DELETE,
                p::ORDERS_PROCESS, p::ORDERS_MANAGE, p::ORDERS_ASSIGN,
                p::MARKETING_READ, p::MARKETING_CREATE, p::MARKETING_UPDATE, p::MARKETING_DELETE,
                p::DISCOUNTS_MANAGE, p::FEATURED_ITEMS_MANAGE, p::CAMPAIGNS_MANAGE,
                p::FINANCE_READ, p::FINANCE_REPORTS, p::ACCOUNTS_PAYABLE, p::ACCOUNTS_RECEIVABLE,
                p::PAYMENTS_MANAGE, p::INVOICES_MANAGE, p::REFUNDS_MANAGE,
                p::SUPPORT_READ, p::SUPPORT_CREATE, p::SUPPORT_UPDATE, p::SUPPORT_MANAGE,
                p::TICKETS_MANAGE, p::CUSTOMER_INTERACT, p::COMPLAINTS_HANDLE, p::ORDERS_ON_BEHALF,
                p::DELIVERY_READ, p::DELIVERY_UPDATE, p::DELIVERY_ASSIGN, p::DELIVERY_MANAGE,
                p::LOGISTICS_MANAGE, p::DELIVERY_TRACKING, p::ROUTE_OPTIMIZATION,
                p::VENDORS_READ, p::VENDORS_MANAGE, p::VENDOR_ONBOARDING, p::VENDOR_PAYMENTS,
                p::AFFILIATE_READ, p::AFFILIATE_MANAGE, p::COMMISSIONS_MANAGE,
                p::REPORTS_READ, p::REPORTS_EXPORT, p::ANALYTICS_READ, p::DASHBOARD_ACCESS,
                p::SYSTEM_READ, p::SYSTEM_UPDATE, p::SYSTEM_MANAGE, p::AUDIT_LOGS_READ,
            ],
        ),
        (
            roles::CUSTOMER,
            vec![
                p::PARTS_READ,
                p::ORDERS_READ, p::ORDERS_CREATE,
                p::SUPPORT_CREATE,
                p::DASHBOARD_ACCESS,
            ],
        ),
        (
            roles::MECHANIC,
            vec![
                p::PARTS_READ,
                p::ORDERS_READ, p::ORDERS_CREATE,
                p::SUPPORT_CREATE,
                p::AFFILIATE_READ, p::COMMISSIONS_MANAGE,
                p::DASHBOARD_ACCESS, p::REPORTS_READ,
            ],
        ),
        (
            roles::VENDOR,
            vec![
                p::PARTS_READ, p::PARTS_CREATE, p::PARTS_UPDATE,
                p::INVENTORY_READ, p::INVENTORY_UPDATE,
                p::ORDERS_READ, p::ORDERS_UPDATE,
                p::VENDORS_READ,
                p::DASHBOARD_ACCESS, p::REPORTS_READ,
                p::SUPPORT_CREATE,
            ],
        ),
        (
            roles::MARKETER,
            vec![
                p::PARTS_READ, p::PARTS_UPDATE,
                p::MARKETING_READ, p::MARKETING_CREATE, p::MARKETING_UPDATE, p::MARKETING_DELETE,
                p::DISCOUNTS_MANAGE, p::FEATURED_ITEMS_MANAGE, p::CAMPAIGNS_MANAGE,
                p::ANALYTICS_READ, p::DASHBOARD_ACCESS,
                p::REPORTS_READ, p::REPORTS_EXPORT,
                p::SUPPORT_READ,
            ],
        ),
        (
            roles::FINANCE,
            vec![
                p::FINANCE_READ, p::FINANCE_REPORTS,
                p::ACCOUNTS_PAYABLE, p::ACCOUNTS_RECEIVABLE,
                p::PAYMENTS_MANAGE, p::INVOICES_MANAGE, p::REFUNDS_MANAGE,
                p::ORDERS_READ, p::ORDERS_UPDATE,
                p::VENDOR_PAYMENTS, p::COMMISSIONS_MANAGE,
                p::REPORTS_READ, p::REPORTS_EXPORT,
                p::ANALYTICS_READ, p::DASHBOARD_ACCESS,
                p::SUPPORT_READ,
            ],
        ),
        (
            roles::CUSTOMER_SUPPORT,
            vec![
                p::SUPPORT_READ, p::SUPPORT_CREATE, p::SUPPORT_UPDATE, p::SUPPORT_MANAGE,
                p::TICKETS_MANAGE, p::CUSTOMER_INTERACT, p::COMPLAINTS_HANDLE,
                p::ORDERS_READ, p::ORDERS_CREATE, p::ORDERS_UPDATE, p::ORDERS_ON_BEHALF,
                p::PARTS_READ,
                p::USERS_READ, p::USERS_UPDATE,
                p::REFUNDS_MANAGE,
                p::DASHBOARD_ACCESS, p::REPORTS_READ,
            ],
        ),
        (
            roles::DELIVERY,
            vec![
                p::DELIVERY_READ, p::DELIVERY_UPDATE, p::DELIVERY_TRACKING,
                p::ORDERS_READ, p::ORDERS_UPDATE,
                p::DASHBOARD_ACCESS,
                p::SUPPORT_CREATE,
            ],
        ),
        (
            roles::DELIVERY_MANAGER,
            vec![
                p::DELIVERY_READ, p::DELIVERY_UPDATE, p::DELIVERY_ASSIGN, p::DELIVERY_MANAGE,
                p::LOGISTICS_MANAGE, p::DELIVERY_TRACKING, p::ROUTE_OPTIMIZATION,
                p::ORDERS_READ, p::ORDERS_UPDATE, p::ORDERS_ASSIGN,
                p::USERS_READ, p::USERS_UPDATE,
                p::REPORTS_READ, p::REPORTS_EXPORT,
                p::ANALYTICS_READ, p::DASHBOARD_ACCESS,
                p::SUPPORT_READ, p::SUPPORT_CREATE,
            ],
        ),
    ]
}

#[derive(Debug, Clone)]
pub struct PermissionCatalog {
    grants: HashMap<String, BTreeSet<String>>,
}

impl Default for PermissionCatalog {
    fn default() -> Self {
        Self::from_grants(
            default_grants()
                .into_iter()
                .map(|(role, perms)| (role.to_string(), perms.into_iter().map(String::from).collect())),
        )
    }
}

impl PermissionCatalog {
    /// Duplicate (role, permission) pairs collapse into one grant.
    pub fn from_grants<I>(grants: I) -> Self
    where
        I: IntoIterator<Item = (String, Vec<String>)>,
    {
        let mut map: HashMap<String, BTreeSet<String>> = HashMap::new();
        for (role, perms) in grants {
            map.entry(role).or_default().extend(perms);
        }
        Self { grants: map }
    }

    /// Unknown roles resolve to the empty set.
    pub fn permissions_for(&self, role: &str) -> BTreeSet<String> {
        self.grants.get(role).cloned().unwrap_or_default()
    }

    /// Union across `roles`, de-duplicated and sorted.
    pub fn effective_permissions<S: AsRef<str>>(&self, roles: &[S]) -> BTreeSet<String> {
        roles
            .iter()
            .filter_map(|r| self.grants.get(r.as_ref()))
            .flat_map(|perms| perms.iter().cloned())
            .collect()
    }

    pub fn role_has_permission(&self, role: &str, permission: &str) -> bool {
        self.grants
            .get(role)
            .is_some_and(|perms| perms.contains(permission))
    }

    pub fn is_known_role(&self, role: &str) -> bool {
        self.grants.contains_key(role)
    }
}
