//! Pluggable reply localization.
//!
//! `examples/original_source/core.go` hard-codes an `i18n` table keyed by a
//! two-letter language string derived from the caller's client locale.
//! Since that derivation step lives in the out-of-scope command interpreter,
//! this crate exposes the table itself as a trait and lets the caller pick
//! an implementation instead of threading a language code through every
//! call.

/// One implementation per language. Mirrors the fields of `botReplies` in
/// `core.go`; `%s`/`%d` positional formatting becomes explicit arguments.
pub trait Locale: Send + Sync {
    fn invalid_request(&self) -> &str;
    fn help_msg(&self) -> &str;
    fn ok_added(&self, dest: &str, source: &str) -> String;
    fn no_such_group(&self, name: &str) -> String;
    fn no_such_user(&self, name: &str) -> String;
    fn no_such_channel(&self, name: &str) -> String;
    fn group_private(&self, name: &str) -> String;
    fn user_private(&self, name: &str) -> String;
    fn query_failed(&self) -> &str;
    fn no_such_sub(&self) -> &str;
    fn del_success(&self, link_id: i64) -> String;
    fn no_subs(&self) -> &str;
    fn not_admin(&self) -> &str;
    /// Not present in `core.go`'s table; supplemented here since an
    /// already-subscribed reply is otherwise indistinguishable from success.
    fn already_subscribed(&self) -> &str;
    /// Not present in `core.go`'s table; supplemented here so a
    /// limit-reached rejection reads differently from an unknown failure.
    fn limit_reached(&self) -> &str;
}

pub struct EnglishLocale;

impl Locale for EnglishLocale {
    fn invalid_request(&self) -> &str {
        "Invalid request"
    }

    fn help_msg(&self) -> &str {
        "1. Add this bot to your channel with permission to post messages\n\
         2. Send <code>/add vk.com/group @channel</code> to begin crossposting from group to channel. \
         Use \"me\" instead of username to get messages in DM.\n\
         You can crosspost from personal wall too as long as it is public\n\n\
         If you want to crosspost to a private channel without a username, you can obtain its id through \
         @username_to_id_bot and send <code>/add vk.com/group id</code> without the @ sign. \
         A successful /add command creates a subscription identified by a number. To see all your subscriptions \
         with their ids send /ls. To delete a particular subscription send <code>/del id</code>."
    }

    fn ok_added(&self, dest: &str, source: &str) -> String {
        format!("{dest} is now subscribed to {source}")
    }

    fn no_such_group(&self, name: &str) -> String {
        format!("Group {name} does not exist")
    }

    fn no_such_user(&self, name: &str) -> String {
        format!("User {name} does not exist")
    }

    fn no_such_channel(&self, name: &str) -> String {
        format!("Channel {name} does not exist")
    }

    fn group_private(&self, name: &str) -> String {
        format!("Group {name} is private or blocked")
    }

    fn user_private(&self, name: &str) -> String {
        format!("User page {name} is private or blocked")
    }

    fn query_failed(&self) -> &str {
        "Failed to execute operation because of an unknown error"
    }

    fn no_such_sub(&self) -> &str {
        "No subscription with such id"
    }

    fn del_success(&self, link_id: i64) -> String {
        format!("subscription {link_id} successfully deleted")
    }

    fn no_subs(&self) -> &str {
        "No subscriptions to show"
    }

    fn not_admin(&self) -> &str {
        "At least one of us is not admin of the chat. We both shall be."
    }

    fn already_subscribed(&self) -> &str {
        "This subscription already exists"
    }

    fn limit_reached(&self) -> &str {
        "You've reached your subscription limit"
    }
}

pub struct RussianLocale;

impl Locale for RussianLocale {
    fn invalid_request(&self) -> &str {
        "Инвалид сюнтах"
    }

    fn help_msg(&self) -> &str {
        "1. Добавь меня в свой канал и дай разрешение отправлять сообщения\n\
         2. Отправь <code>/add vk.com/group @channel</code>, чтобы начать дублировать посты из группы в канал. \
         Используй \"me\" вместо юзернейма, чтобы получать посты в ЛС. \
         Вместо группы также может быть личная страница, если она публично доступна.\n\n\
         Чтобы кросспостить в закрытый канал или группу без юзернейма, можешь получить её id через \
         @username_to_id_bot и отправить <code>/add vk.com/group id</code> (без @).\n\
         После добавления через /add создаётся подписка и ей присваивается id. Чтобы посмотреть свои подписки, \
         напиши /ls. Чтобы удалить подписку, отправь <code>/del id</code>."
    }

    fn ok_added(&self, dest: &str, source: &str) -> String {
        format!("{dest} теперь подписан на {source}")
    }

    fn no_such_group(&self, name: &str) -> String {
        format!("Группа {name} не существует")
    }

    fn no_such_user(&self, name: &str) -> String {
        format!("Пользователь {name} не существует")
    }

    fn no_such_channel(&self, name: &str) -> String {
        format!("Канал {name} не существует")
    }

    fn group_private(&self, name: &str) -> String {
        format!("Группа {name} закрыта или заблокирована")
    }

    fn user_private(&self, name: &str) -> String {
        format!("Страница пользователя {name} заблокирована или скрыта")
    }

    fn query_failed(&self) -> &str {
        "Не удалось выполнить запрос из-за неизвестной ошибки"
    }

    fn no_such_sub(&self) -> &str {
        "Нет подписки с таким id"
    }

    fn del_success(&self, link_id: i64) -> String {
        format!("Подписка {link_id} успешно удалена")
    }

    fn no_subs(&self) -> &str {
        "Список каналов пуст"
    }

    fn not_admin(&self) -> &str {
        "Как минимум одному из нас не хватает прав администратора этого чата. Они должны быть у нас обоих."
    }

    fn already_subscribed(&self) -> &str {
        "Такая подписка уже существует"
    }

    fn limit_reached(&self) -> &str {
        "Достигнут лимит подписок"
    }
}

/// Maps a raw client-reported language tag to a [`Locale`]. Mirrors
/// `core.go`'s grouping of `ru`/`uk`/`kz`/`be` under Russian and everything
/// else under English.
pub fn locale_for_tag(tag: &str) -> Box<dyn Locale> {
    match tag {
        "ru" | "uk" | "kz" | "be" => Box::new(RussianLocale),
        _ => Box::new(EnglishLocale),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_grouping_matches_original_table() {
        assert_eq!(locale_for_tag("ru").invalid_request(), "Инвалид сюнтах");
        assert_eq!(locale_for_tag("uk").invalid_request(), "Инвалид сюнтах");
        assert_eq!(locale_for_tag("fr").invalid_request(), "Invalid request");
        assert_eq!(locale_for_tag("en").invalid_request(), "Invalid request");
    }

    #[test]
    fn formatted_replies_interpolate_arguments() {
        let en = EnglishLocale;
        assert_eq!(en.ok_added("@chan", "vk.com/group"), "@chan is now subscribed to vk.com/group");
        assert_eq!(en.del_success(42), "subscription 42 successfully deleted");
    }
}
