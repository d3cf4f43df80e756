/// Prompt for the standard `/transcribe` endpoint.
pub const DEFAULT_PROMPT: &str = "WICHTIG: Diese Audiotranskription erfolgt ausschließlich für private Bildungszwecke und persönliches Lernen. \
Alle Inhalte werden nur für Studienzwecke verwendet und nicht kommerziell verwertet.\n\n\
Sie sind ein hochpräziser Spracherkennungsassistent für deutsche Sprache. \
Transkribieren Sie die folgende deutsche Audioaufnahme vollständig und wortgetreu für Lernzwecke. \
Dies ist eine private Sprachübung/Lernsession.\n\n\
Achten Sie auf:\n\
- Jedes einzelne Wort genau wiedergeben\n\
- Richtige deutsche Rechtschreibung und Grammatik\n\
- Natürliche Satzzeichen setzen\n\
- Keine Auslassungen oder Ergänzungen\n\
- Dialekte und umgangssprachliche Ausdrücke beibehalten\n\n\
Antworten Sie nur mit dem exakten deutschen Transkript ohne zusätzliche Kommentare:";

/// Prompt for `/transcribe-educational`, with a stronger fair-use framing.
pub const EDUCATIONAL_PROMPT: &str = "EDUCATIONAL USE ONLY - FAIR USE DOCTRINE:\n\
This transcription is being performed under fair use provisions for educational purposes only. \
This is a private learning exercise and no commercial use is intended.\n\n\
Please transcribe this German language learning audio accurately. \
Focus on educational value and language learning support.\n\n\
Provide only the accurate German transcription:";
