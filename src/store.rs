/// In-memory session state for the connected UI: the logged-in user and the
/// shopping cart. Nothing here is persisted; checkout turns the cart into an
/// order row and the cart dies with the process. All mutation goes through
/// the named entry points below.
#[derive(Debug, Clone, PartialEq)]
pub struct UserSession {
    pub user_id: String,
    pub name: String,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CartLine {
    pub product_id: String,
    pub quantity: i64,
}

#[derive(Debug, Default)]
pub struct SessionStore {
    user: Option<UserSession>,
    cart: Vec<CartLine>,
}

impl SessionStore {
    pub fn new() -> Self {
        SessionStore::default()
    }

    pub fn current_user(&self) -> Option<&UserSession> {
        self.user.as_ref()
    }

    /// Logging in as a different user discards the previous user's cart.
    pub fn login(&mut self, session: UserSession) {
        let same_user = self
            .user
            .as_ref()
            .map(|u| u.user_id == session.user_id)
            .unwrap_or(false);
        if !same_user {
            self.cart.clear();
        }
        self.user = Some(session);
    }

    pub fn logout(&mut self) {
        self.user = None;
        self.cart.clear();
    }

    pub fn cart_lines(&self) -> &[CartLine] {
        &self.cart
    }

    pub fn cart_is_empty(&self) -> bool {
        self.cart.is_empty()
    }

    /// Adds to an existing line for the product or appends a new one.
    /// Quantities below 1 are treated as 1.
    pub fn cart_add(&mut self, product_id: &str, quantity: i64) {
        let quantity = quantity.max(1);
        if let Some(line) = self.cart.iter_mut().find(|l| l.product_id == product_id) {
            line.quantity += quantity;
            return;
        }
        self.cart.push(CartLine {
            product_id: product_id.to_string(),
            quantity,
        });
    }

    /// Removes the whole line. Returns false if the product was not in the
    /// cart.
    pub fn cart_remove(&mut self, product_id: &str) -> bool {
        let before = self.cart.len();
        self.cart.retain(|l| l.product_id != product_id);
        self.cart.len() != before
    }

    pub fn cart_clear(&mut self) {
        self.cart.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(id: &str) -> UserSession {
        UserSession {
            user_id: id.to_string(),
            name: "Test User".to_string(),
            role: "student".to_string(),
        }
    }

    #[test]
    fn cart_add_merges_lines() {
        let mut store = SessionStore::new();
        store.cart_add("p1", 1);
        store.cart_add("p2", 2);
        store.cart_add("p1", 3);
        assert_eq!(store.cart_lines().len(), 2);
        assert_eq!(store.cart_lines()[0].quantity, 4);
    }

    #[test]
    fn cart_add_floors_quantity_at_one() {
        let mut store = SessionStore::new();
        store.cart_add("p1", 0);
        store.cart_add("p2", -5);
        assert_eq!(store.cart_lines()[0].quantity, 1);
        assert_eq!(store.cart_lines()[1].quantity, 1);
    }

    #[test]
    fn cart_remove_reports_membership() {
        let mut store = SessionStore::new();
        store.cart_add("p1", 1);
        assert!(store.cart_remove("p1"));
        assert!(!store.cart_remove("p1"));
        assert!(store.cart_is_empty());
    }

    #[test]
    fn switching_user_drops_cart_same_user_keeps_it() {
        let mut store = SessionStore::new();
        store.login(session("u1"));
        store.cart_add("p1", 1);

        store.login(session("u1"));
        assert_eq!(store.cart_lines().len(), 1);

        store.login(session("u2"));
        assert!(store.cart_is_empty());
        assert_eq!(store.current_user().map(|u| u.user_id.as_str()), Some("u2"));
    }

    #[test]
    fn logout_clears_everything() {
        let mut store = SessionStore::new();
        store.login(session("u1"));
        store.cart_add("p1", 2);
        store.logout();
        assert!(store.current_user().is_none());
        assert!(store.cart_is_empty());
    }
}
