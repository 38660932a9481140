use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub imap: ImapConfig,
    pub pdf_password: String,
    pub extraction: ExtractionConfig,
    pub sheets: SheetsConfig,
    pub sender: String,
    pub folders: Vec<String>,
    pub lookback_days: i64,
    pub ledger_path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ImapConfig {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionConfig {
    pub api_key: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SheetsConfig {
    pub spreadsheet_url: String,
    pub worksheet: String,
    pub credentials_path: String,
}

impl Config {
    pub fn new() -> Result<Self> {
        // Vérifier que les variables essentielles sont définies
        Self::check_required_env_vars()?;

        // Configuration chargée depuis les variables d'environnement
        Ok(Config {
            imap: ImapConfig {
                server: std::env::var("IMAP_SERVER")
                    .expect("IMAP_SERVER doit être défini"),
                port: std::env::var("IMAP_PORT")
                    .unwrap_or_else(|_| "993".to_string())
                    .parse()
                    .unwrap_or(993),
                username: std::env::var("EMAIL_ACCOUNT")
                    .expect("EMAIL_ACCOUNT doit être défini"),
                password: std::env::var("EMAIL_PASSWORD")
                    .expect("EMAIL_PASSWORD doit être défini"),
            },
            pdf_password: std::env::var("PDF_PASSWORD")
                .expect("PDF_PASSWORD doit être défini"),
            extraction: ExtractionConfig {
                api_key: match std::env::var("PERPLEXITY_API_KEY") {
                    Ok(api_key) => api_key,
                    Err(_) => {
                        log::warn!("PERPLEXITY_API_KEY non défini - les montants ne seront pas extraits");
                        String::new()
                    }
                },
            },
            sheets: SheetsConfig {
                spreadsheet_url: match std::env::var("SPREADSHEET_URL") {
                    Ok(url) => url,
                    Err(_) => {
                        log::warn!("SPREADSHEET_URL non défini - les lignes ne seront pas ajoutées au tableur");
                        String::new()
                    }
                },
                worksheet: std::env::var("WORKSHEET_NAME")
                    .unwrap_or_else(|_| "Payslip Email Finder".to_string()),
                credentials_path: std::env::var("GOOGLE_CREDENTIALS_PATH")
                    .unwrap_or_else(|_| "credentials.json".to_string()),
            },
            sender: std::env::var("PAYSLIP_SENDER")
                .unwrap_or_else(|_| "payslips@brightpay.ie".to_string()),
            folders: std::env::var("PAYSLIP_FOLDERS")
                .unwrap_or_else(|_| "INBOX,1. Payslips".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            lookback_days: std::env::var("LOOKBACK_DAYS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .unwrap_or(30),
            ledger_path: std::env::var("LEDGER_PATH")
                .unwrap_or_else(|_| "processed_emails.json".to_string()),
        })
    }

    fn check_required_env_vars() -> Result<()> {
        let required_vars = [
            "IMAP_SERVER",
            "EMAIL_ACCOUNT",
            "EMAIL_PASSWORD",
            "PDF_PASSWORD",
        ];

        let mut missing_vars = Vec::new();

        for var in &required_vars {
            if std::env::var(var).is_err() {
                missing_vars.push(*var);
            }
        }

        if !missing_vars.is_empty() {
            anyhow::bail!(
                "Variables d'environnement manquantes: {}\n\
                 \n\
                 💡 Solutions :\n\
                 1. Créer un fichier .env avec vos credentials :\n\
                    cp .env.example .env\n\
                    # Puis éditer .env avec vos valeurs\n\
                 \n\
                 2. Ou définir les variables manuellement :\n\
                    export IMAP_SERVER=imap.gmail.com\n\
                    export EMAIL_ACCOUNT=you@example.com\n\
                    export EMAIL_PASSWORD=app-password\n\
                    export PDF_PASSWORD=1146\n\
                    cargo run -- --check-config",
                missing_vars.join(", ")
            );
        }

        Ok(())
    }
}
