use anyhow::Result;
use serenity::all::*;

use crate::automod::blacklist::BlacklistError;
use crate::AppContext;

const SYSTEM_NAME: &str = "Morrible Blacklist";

pub struct Blacklist;

impl Blacklist {
    pub async fn register_commands(ctx: &Context, gid: GuildId) -> Result<()> {
        gid.create_command(
            &ctx.http,
            CreateCommand::new("blacklist_add")
                .description("Dodaj słowo do czarnej listy AutoModa")
                .add_option(
                    CreateCommandOption::new(CommandOptionType::String, "word", "Słowo (2-50 znaków)")
                        .required(true),
                )
                .default_member_permissions(Permissions::ADMINISTRATOR),
        )
        .await?;

        gid.create_command(
            &ctx.http,
            CreateCommand::new("blacklist_remove")
                .description("Usuń słowo z czarnej listy AutoModa")
                .add_option(
                    CreateCommandOption::new(CommandOptionType::String, "word", "Słowo")
                        .required(true),
                )
                .default_member_permissions(Permissions::ADMINISTRATOR),
        )
        .await?;

        gid.create_command(
            &ctx.http,
            CreateCommand::new("blacklist_list")
                .description("Pokaż słowa z czarnej listy")
                .default_member_permissions(Permissions::ADMINISTRATOR),
        )
        .await?;

        Ok(())
    }

    pub async fn on_interaction(ctx: &Context, app: &AppContext, interaction: Interaction) {
        let Some(cmd) = interaction.command() else {
            return;
        };
        if !matches!(cmd.data.name.as_str(), "blacklist_add" | "blacklist_remove" | "blacklist_list") {
            return;
        }

        // domyślne uprawnienia komendy da się nadpisać w ustawieniach serwera
        let perms = cmd.member.as_ref().and_then(|m| m.permissions);
        if !grants_admin(perms) {
            tracing::info!(user_id = cmd.user.id.get(), command=%cmd.data.name, "blacklist command denied");
            if let Err(e) = reply_ephemeral(ctx, &cmd, "⛔ Brak uprawnień.").await {
                tracing::warn!(error=?e, "blacklist deny reply failed");
            }
            return;
        }

        let res = match cmd.data.name.as_str() {
            "blacklist_add" => handle_add(ctx, app, &cmd).await,
            "blacklist_remove" => handle_remove(ctx, app, &cmd).await,
            "blacklist_list" => handle_list(ctx, app, &cmd).await,
            _ => return,
        };
        if let Err(e) = res {
            tracing::warn!(error=?e, command=%cmd.data.name, "blacklist command failed");
        }
    }
}

/// Tylko administrator serwera. Brak danych o uprawnieniach (np. DM) = odmowa.
fn grants_admin(perms: Option<Permissions>) -> bool {
    perms.is_some_and(|p| p.administrator())
}

fn word_option(cmd: &CommandInteraction) -> Option<String> {
    cmd.data.options.iter().find_map(|o| match (&o.name[..], &o.value) {
        ("word", CommandDataOptionValue::String(s)) => Some(s.clone()),
        _ => None,
    })
}

async fn handle_add(ctx: &Context, app: &AppContext, cmd: &CommandInteraction) -> Result<()> {
    let Some(word) = word_option(cmd) else {
        return reply_ephemeral(ctx, cmd, "Musisz podać słowo.").await;
    };
    match app.blacklist.add_word(&word).await {
        Ok(words) => {
            tracing::info!(moderator_id = cmd.user.id.get(), total = words.len(), "blacklist word added");
            reply_ephemeral(ctx, cmd, &format!("✅ Dodano `{}` do czarnej listy.", word.trim().to_lowercase())).await
        }
        Err(BlacklistError::InvalidLength) => {
            reply_ephemeral(ctx, cmd, "⛔ Słowo musi mieć od 2 do 50 znaków.").await
        }
        Err(e) => {
            tracing::warn!(error=?e, "blacklist add failed");
            reply_ephemeral(ctx, cmd, "⛔ Nie udało się zapisać czarnej listy.").await
        }
    }
}

async fn handle_remove(ctx: &Context, app: &AppContext, cmd: &CommandInteraction) -> Result<()> {
    let Some(word) = word_option(cmd) else {
        return reply_ephemeral(ctx, cmd, "Musisz podać słowo.").await;
    };
    let cleaned = word.trim().to_lowercase();
    if !app.blacklist.words().contains(&cleaned) {
        return reply_ephemeral(ctx, cmd, &format!("`{cleaned}` nie ma na czarnej liście.")).await;
    }
    match app.blacklist.remove_word(&word).await {
        Ok(_) => reply_ephemeral(ctx, cmd, &format!("🗑️ Usunięto `{cleaned}` z czarnej listy.")).await,
        Err(e) => {
            tracing::warn!(error=?e, "blacklist remove failed");
            reply_ephemeral(ctx, cmd, "⛔ Nie udało się zapisać czarnej listy.").await
        }
    }
}

async fn handle_list(ctx: &Context, app: &AppContext, cmd: &CommandInteraction) -> Result<()> {
    let words = app.blacklist.words();
    let body = if words.is_empty() {
        "Czarna lista jest pusta.".to_string()
    } else {
        truncate(&words.iter().map(|w| format!("`{w}`")).collect::<Vec<_>>().join(", "), 4000)
    };
    let embed = CreateEmbed::new()
        .title(format!("🚫 Czarna lista ({})", words.len()))
        .colour(Colour::new(0xC0392B))
        .description(body)
        .footer(CreateEmbedFooter::new(SYSTEM_NAME));
    cmd.create_response(
        &ctx.http,
        CreateInteractionResponse::Message(
            CreateInteractionResponseMessage::new().embed(embed).ephemeral(true),
        ),
    )
    .await?;
    Ok(())
}

async fn reply_ephemeral(ctx: &Context, cmd: &CommandInteraction, msg: &str) -> Result<()> {
    cmd.create_response(
        &ctx.http,
        CreateInteractionResponse::Message(
            CreateInteractionResponseMessage::new().content(msg).ephemeral(true),
        ),
    )
    .await?;
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut t: String = s.chars().take(max.saturating_sub(1)).collect();
        t.push('…');
        t
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_administrators_pass() {
        assert!(grants_admin(Some(Permissions::ADMINISTRATOR)));
        assert!(grants_admin(Some(Permissions::ADMINISTRATOR | Permissions::BAN_MEMBERS)));
        assert!(!grants_admin(Some(Permissions::MANAGE_MESSAGES | Permissions::BAN_MEMBERS)));
        assert!(!grants_admin(Some(Permissions::empty())));
        assert!(!grants_admin(None));
    }

    #[test]
    fn long_lists_are_truncated() {
        assert_eq!(truncate("abc", 5), "abc");
        assert_eq!(truncate("abcdef", 4), "abc…");
    }
}
