use super::Services;
use crate::error::AuthenticatorError;
use crate::registry::Principal;

pub fn handle_grant(services: &Services, uid: u32, package: &str) -> Result<(), AuthenticatorError> {
    services.broker.grant(Principal(uid), package)?;
    println!("Granted token access to '{}' (uid {}).", package, uid);
    Ok(())
}

pub fn handle_check(services: &Services, uid: u32) {
    match services.registry.granted_package(Principal(uid)) {
        Some(package) => println!("uid {} is authorized ({}).", uid, package),
        None => println!("uid {} is NOT authorized.", uid),
    }
}

pub fn handle_packages(services: &Services) -> Result<(), AuthenticatorError> {
    let packages = services.registry.granted_packages()?;
    if packages.is_empty() {
        println!("No packages granted yet.");
    }
    for (i, package) in packages.iter().enumerate() {
        println!("{:>3}. {}", i + 1, package);
    }
    Ok(())
}

pub fn handle_accounts(services: &Services) {
    let mut accounts = services.accounts.all_accounts();
    accounts.sort_by(|a, b| a.name.cmp(&b.name));
    if accounts.is_empty() {
        println!("No accounts stored.");
    }
    for account in accounts {
        println!(
            "{} ({}) @ {} - {} cached token(s)",
            account.name,
            account.account_type,
            account.server_url,
            account.auth_tokens.len()
        );
    }
}
