use rand::{distributions::Alphanumeric, thread_rng, Rng};

pub fn generate_access_token(length: usize) -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// Upper-case code students type to join a unit.
pub fn generate_join_code() -> String {
    generate_access_token(8).to_ascii_uppercase()
}

pub fn generate_numeric_code(digits: usize) -> String {
    let mut rng = thread_rng();
    (0..digits)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

/// Temporary password that satisfies the password policy.
pub fn generate_temporary_password() -> String {
    const SPECIALS: &[u8] = b"!@#$%&*?";
    let mut rng = thread_rng();
    let special = SPECIALS[rng.gen_range(0..SPECIALS.len())] as char;
    format!(
        "{}{}{}",
        generate_access_token(10),
        generate_numeric_code(2),
        special
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::validation::check_password_policy;

    #[test]
    fn join_codes_are_upper_alphanumeric() {
        let code = generate_join_code();
        assert_eq!(code.len(), 8);
        assert!(code
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn numeric_codes_are_digits() {
        let code = generate_numeric_code(6);
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn temporary_passwords_pass_policy() {
        for _ in 0..20 {
            assert!(check_password_policy(&generate_temporary_password()).is_ok());
        }
    }
}
