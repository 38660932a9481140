use anyhow::{Context, Result};
use async_imap::Session;
use async_native_tls::{TlsConnector, TlsStream};
use futures::stream::StreamExt;
use log::{debug, info, warn};
use tokio::net::TcpStream;
use tokio_util::compat::TokioAsyncReadCompatExt;

use crate::config::ImapConfig;

pub struct FetchedEmail {
    pub content: Vec<u8>,
    pub date: chrono::DateTime<chrono::Utc>,
}

pub struct ImapClient {
    session: Session<TlsStream<tokio_util::compat::Compat<TcpStream>>>,
}

impl ImapClient {
    pub async fn new(config: &ImapConfig) -> Result<Self> {
        info!("Connexion au serveur IMAP {}:{}", config.server, config.port);

        // Créer une connexion TCP
        let tcp_stream = TcpStream::connect((config.server.as_str(), config.port))
            .await
            .context("Impossible de se connecter au serveur IMAP")?;

        // Wrapper pour compatibilité futures
        let tcp_stream_compat = tcp_stream.compat();

        // Créer une connexion TLS
        let tls = TlsConnector::new();
        let tls_stream = tls
            .connect(&config.server, tcp_stream_compat)
            .await
            .context("Impossible d'établir la connexion TLS")?;

        // Créer le client IMAP avec async-imap
        let client = async_imap::Client::new(tls_stream);

        // Authentification
        let session = client
            .login(&config.username, &config.password)
            .await
            .map_err(|e| anyhow::anyhow!("Erreur d'authentification IMAP: {:?}", e.0))?;

        info!("Connexion IMAP établie avec succès");

        Ok(ImapClient { session })
    }

    /// Selects a folder and returns how many messages it holds.
    pub async fn select_folder(&mut self, folder: &str) -> Result<u32> {
        debug!("Sélection du dossier '{}'", folder);

        let mailbox = self
            .session
            .select(folder)
            .await
            .with_context(|| format!("Impossible de sélectionner le dossier '{}'", folder))?;

        debug!("Le dossier '{}' contient {} message(s)", folder, mailbox.exists);

        Ok(mailbox.exists)
    }

    /// Searches the selected folder for messages from the given sender
    /// received on or after the given IMAP date (e.g. `06-Jan-2024`).
    /// Ids come back sorted ascending so the oldest payslip lands first.
    pub async fn search_sender_since(&mut self, sender: &str, since: &str) -> Result<Vec<u32>> {
        let search_criteria = format!("(FROM \"{}\" SINCE {})", sender, since);

        debug!("Critères de recherche: {}", search_criteria);

        let message_ids = self
            .session
            .search(&search_criteria)
            .await
            .context("Erreur lors de la recherche des emails de paie")?;

        let mut ids_vec: Vec<u32> = message_ids.into_iter().collect();
        ids_vec.sort_unstable();

        info!("🔍 Trouvé {} email(s) de {}", ids_vec.len(), sender);

        Ok(ids_vec)
    }

    pub async fn fetch_email(&mut self, message_id: u32) -> Result<FetchedEmail> {
        debug!("Récupération de l'email ID: {}", message_id);

        // Un seul fetch pour récupérer tout le contenu de l'email
        let messages_stream = self
            .session
            .fetch(message_id.to_string(), "RFC822")
            .await
            .context("Impossible de récupérer l'email")?;

        // Collecter le stream en vec
        let messages: Vec<_> = messages_stream
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .filter_map(|r| r.ok())
            .collect();

        if let Some(message) = messages.first() {
            if let Some(body) = message.body() {
                debug!("Email récupéré, taille: {} bytes", body.len());

                let email_date = Self::parse_email_date(body).unwrap_or_else(|| {
                    warn!(
                        "⚠️ Email {} sans date exploitable, utilisation de l'heure actuelle",
                        message_id
                    );
                    chrono::Utc::now()
                });

                return Ok(FetchedEmail {
                    content: body.to_vec(),
                    date: email_date,
                });
            }
        }

        anyhow::bail!("Email introuvable ou vide pour l'ID: {}", message_id);
    }

    fn parse_email_date(body: &[u8]) -> Option<chrono::DateTime<chrono::Utc>> {
        if let Some(parsed_email) = mail_parser::MessageParser::default().parse(body) {
            if let Some(date_header) = parsed_email.date() {
                return chrono::DateTime::from_timestamp(date_header.to_timestamp(), 0)
                    .map(|dt| dt.with_timezone(&chrono::Utc));
            }
        }

        // Fallback : chercher la ligne Date: dans les headers
        Self::parse_date_from_raw_headers(&String::from_utf8_lossy(body))
    }

    fn parse_date_from_raw_headers(email_content: &str) -> Option<chrono::DateTime<chrono::Utc>> {
        for line in email_content.lines().take(50) {
            if line.is_empty() {
                break; // Fin des headers
            }

            if let Some(date_part) = line.strip_prefix("Date: ") {
                if let Ok(parsed_date) = chrono::DateTime::parse_from_rfc2822(date_part.trim()) {
                    return Some(parsed_date.with_timezone(&chrono::Utc));
                }
            }
        }
        None
    }

    pub async fn logout(mut self) -> Result<()> {
        info!("Déconnexion du serveur IMAP");
        self.session
            .logout()
            .await
            .context("Erreur lors de la déconnexion IMAP")?;
        Ok(())
    }
}
