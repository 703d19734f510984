use crate::locator::CaptionTrackDescriptor;

/// Pick one caption track for the preferred languages.
///
/// Precedence: a manual track in a preferred language, then any track in a
/// preferred language, then the first track. `None` only for an empty list.
pub fn select_track<'a, S: AsRef<str>>(
    tracks: &'a [CaptionTrackDescriptor],
    languages: &[S],
) -> Option<&'a CaptionTrackDescriptor> {
    let manual = languages.iter().find_map(|lang| {
        tracks
            .iter()
            .find(|t| !t.is_auto_generated && language_matches(&t.language_code, lang.as_ref()))
    });

    manual
        .or_else(|| {
            languages
                .iter()
                .find_map(|lang| tracks.iter().find(|t| language_matches(&t.language_code, lang.as_ref())))
        })
        .or_else(|| tracks.first())
}

/// `en` matches `en-US` and `en-US` matches `en`; case-insensitive.
pub fn language_matches(track_lang: &str, preferred: &str) -> bool {
    let track_lang = track_lang.trim();
    let preferred = preferred.trim();
    if track_lang.is_empty() || preferred.is_empty() {
        return false;
    }

    track_lang.eq_ignore_ascii_case(preferred)
        || primary_subtag(track_lang).eq_ignore_ascii_case(primary_subtag(preferred))
}

fn primary_subtag(lang: &str) -> &str {
    lang.split(['-', '_']).next().unwrap_or(lang)
}
