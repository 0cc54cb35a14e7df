use crate::configuration::types::AccountConfig;
use crate::error_handling::types::ConfigError;

/// Ordered server accounts and the one currently in use.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountSet {
    accounts: Vec<AccountConfig>,
    index: usize,
}

impl AccountSet {
    pub fn new(accounts: Vec<AccountConfig>, index: usize) -> Result<Self, ConfigError> {
        if accounts.is_empty() {
            return Err(ConfigError::AccountsEmpty(
                "no account to connect with".to_string(),
            ));
        }
        if index >= accounts.len() {
            return Err(ConfigError::NotInRange(format!(
                "account index {} of {}",
                index,
                accounts.len()
            )));
        }
        Ok(Self { accounts, index })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn current(&self) -> &AccountConfig {
        &self.accounts[self.index]
    }

    pub fn all(&self) -> &[AccountConfig] {
        &self.accounts
    }

    /// Selects the next account, wrapping to the first.
    pub fn advance(&mut self) -> &AccountConfig {
        self.index = (self.index + 1) % self.accounts.len();
        self.current()
    }

    /// Selects the previous account, wrapping to the last.
    pub fn retreat(&mut self) -> &AccountConfig {
        self.index = (self.index + self.accounts.len() - 1) % self.accounts.len();
        self.current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(name: &str) -> AccountConfig {
        AccountConfig {
            name: name.to_string(),
            server: format!("{}.example:64738", name),
            username: String::new(),
            password: String::new(),
            insecure: true,
            certificate: None,
            channel: String::new(),
            ident: String::new(),
            comment: None,
        }
    }

    #[test]
    fn hop_wraps_both_ways() {
        let mut set = AccountSet::new(vec![account("a"), account("b"), account("c")], 0).unwrap();

        assert_eq!(set.retreat().name, "c");
        assert_eq!(set.advance().name, "a");
        assert_eq!(set.advance().name, "b");
        assert_eq!(set.advance().name, "c");
        assert_eq!(set.advance().name, "a");
    }

    #[test]
    fn index_must_exist() {
        assert!(AccountSet::new(vec![account("a")], 1).is_err());
        assert!(AccountSet::new(Vec::new(), 0).is_err());
    }
}
