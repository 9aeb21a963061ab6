use satshop_core::AppError;
use satshop_shop::parse_price;
use satshop_storage::models::NewProduct;

/// A parsed chat command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start,
    Balance,
    Products,
    Redeem(i64),
    Purchases,
    Help,
    AddProduct(NewProduct),
    AddCodes { product_id: i64, codes: Vec<String> },
    Stock(i64),
    Unknown(String),
}

pub const HELP: &str = "\
/start - register and show your deposit address
/balance - show your balance
/products - list products
/redeem <product_id> - buy a promo code
/purchases - your recent purchases
/help - this message";

pub const OPERATOR_HELP: &str = "\
/addproduct <category> | <name> | <price> | <description>
/addcodes <product_id> <code> [<code>...]
/stock <product_id>";

impl Command {
    /// Operator-only commands.
    pub fn is_privileged(&self) -> bool {
        matches!(
            self,
            Self::AddProduct(_) | Self::AddCodes { .. } | Self::Stock(_)
        )
    }

    /// Parse a message. Returns `Ok(None)` for text that is not a command.
    pub fn parse(text: &str) -> Result<Option<Self>, AppError> {
        let text = text.trim();
        let Some(rest) = text.strip_prefix('/') else {
            return Ok(None);
        };

        let (head, args) = match rest.split_once(char::is_whitespace) {
            Some((head, args)) => (head, args.trim()),
            None => (rest, ""),
        };
        // Group chats address commands as `/cmd@botname`.
        let name = head.split('@').next().unwrap_or(head).to_ascii_lowercase();

        let command = match name.as_str() {
            "start" => Self::Start,
            "balance" => Self::Balance,
            "products" => Self::Products,
            "purchases" => Self::Purchases,
            "help" => Self::Help,
            "redeem" => Self::Redeem(product_id(args, "/redeem <product_id>")?),
            "stock" => Self::Stock(product_id(args, "/stock <product_id>")?),
            "addcodes" => {
                let mut words = args.split_whitespace();
                let usage = "/addcodes <product_id> <code> [<code>...]";
                let product_id = product_id(words.next().unwrap_or_default(), usage)?;
                let codes: Vec<String> = words.map(str::to_string).collect();
                if codes.is_empty() {
                    return Err(usage_error(usage));
                }
                Self::AddCodes { product_id, codes }
            }
            "addproduct" => Self::AddProduct(new_product(args)?),
            _ => Self::Unknown(name),
        };
        Ok(Some(command))
    }
}

fn usage_error(usage: &str) -> AppError {
    AppError::InvalidInput(format!("Usage: {usage}"))
}

fn product_id(arg: &str, usage: &str) -> Result<i64, AppError> {
    arg.trim()
        .trim_start_matches('#')
        .parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| usage_error(usage))
}

fn new_product(args: &str) -> Result<NewProduct, AppError> {
    let usage = "/addproduct <category> | <name> | <price> | <description>";
    let parts: Vec<&str> = args.splitn(4, '|').map(str::trim).collect();
    if parts.len() < 3 {
        return Err(usage_error(usage));
    }

    Ok(NewProduct {
        category: parts[0].to_string(),
        name: parts[1].to_string(),
        price: parse_price(parts[2])?,
        description: parts.get(3).copied().unwrap_or_default().to_string(),
    })
}
