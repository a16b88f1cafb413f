//! Localized response templates.
//!
//! Fixed user-facing texts per language: welcome, consent prompt and
//! confirmation, clarification wrapper, the "medical topics only" deflection,
//! and the generic error apology. Formatting is stable; tests assert on it.

/// Response language. Selects the template set; extensible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    En,
    Hi,
}

impl Language {
    /// Parses a language code, falling back to English for unknown codes.
    pub fn parse(code: &str) -> Self {
        match code.trim().to_lowercase().as_str() {
            "hi" => Language::Hi,
            _ => Language::En,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Hi => "hi",
        }
    }

    /// Returns the template set for this language.
    pub fn templates(&self) -> &'static Templates {
        match self {
            Language::En => &EN,
            Language::Hi => &HI,
        }
    }
}

/// Fixed response texts for one language.
#[derive(Debug)]
pub struct Templates {
    pub welcome: &'static str,
    pub consent_prompt: &'static str,
    pub consent_confirmed: &'static str,
    /// Wrapper around a generated clarification question; `{question}` is
    /// replaced with the question text.
    pub clarification: &'static str,
    pub not_medical: &'static str,
    pub generic_error: &'static str,
}

impl Templates {
    /// Fills the clarification wrapper with the generated question.
    pub fn clarification_with(&self, question: &str) -> String {
        self.clarification.replace("{question}", question)
    }
}

static EN: Templates = Templates {
    welcome: "**Welcome to Medical Assistant**\n\n\
I'm your intelligent medical assistant powered by AI. I can help you with:\n\n\
- Medical questions and information\n\
- Health advice and guidance\n\
- Disease information and symptoms\n\
- Wellness tips\n\n\
**Important:** I provide general medical information, not professional diagnosis. \
Always consult a doctor for serious concerns.\n\n\
Before we proceed, I need your consent to store our conversation data.",

    consent_prompt: "**Consent Required**\n\n\
To continue, please provide your consent:\n\n\
Your data will be:\n\
- Stored securely in our encrypted database\n\
- Used only for medical assistance\n\
- Never shared with third parties\n\n\
Type: **\"I agree\"** or **\"I consent\"**",

    consent_confirmed: "**Consent Confirmed**\n\n\
Thank you! You can now ask me medical questions.",

    clarification: "**I need clarification**\n\n\
{question}\n\n\
Are you asking about:\n\
1. Medical/health topic\n\
2. Information about me\n\
3. Something else",

    not_medical: "I can only help with medical-related questions.\n\n\
Please ask me about:\n\
- Symptoms and conditions\n\
- Health information\n\
- Medical treatments\n\
- Wellness advice",

    generic_error: "Sorry, something went wrong processing your request. Please try again later.",
};

static HI: Templates = Templates {
    welcome: "**चिकित्सा सहायक में आपका स्वागत है**\n\n\
मैं आपका AI-संचालित चिकित्सा सहायक हूं। मैं आपकी मदद कर सकता हूं:\n\n\
- चिकित्सा प्रश्न और जानकारी\n\
- स्वास्थ्य सलाह\n\
- रोग की जानकारी\n\
- स्वास्थ्य सुझाव\n\n\
**महत्वपूर्ण:** मैं सामान्य चिकित्सा जानकारी देता हूं, निदान नहीं। \
गंभीर समस्याओं के लिए हमेशा डॉक्टर से मिलें।\n\n\
शुरू करने से पहले, कृपया अपनी सहमति दें।",

    consent_prompt: "**सहमति आवश्यक**\n\n\
जारी रखने के लिए, कृपया सहमति दें:\n\n\
आपका डेटा:\n\
- हमारे एन्क्रिप्टेड डेटाबेस में सुरक्षित रूप से संग्रहीत\n\
- केवल चिकित्सा सहायता के लिए उपयोग\n\
- किसी से साझा नहीं किया जाएगा\n\n\
टाइप करें: **\"सहमत हूं\"** या **\"मैं सहमत हूं\"**",

    consent_confirmed: "**सहमति की पुष्टि**\n\n\
धन्यवाद! अब आप मुझसे चिकित्सा प्रश्न पूछ सकते हैं।",

    clarification: "**स्पष्टीकरण की आवश्यकता**\n\n\
{question}\n\n\
क्या आप पूछ रहे हैं:\n\
1. चिकित्सा/स्वास्थ्य विषय\n\
2. मेरे बारे में जानकारी\n\
3. कुछ और",

    not_medical: "मैं केवल चिकित्सा-संबंधित प्रश्नों में मदद कर सकता हूं।\n\n\
मुझसे पूछें:\n\
- लक्षण और स्थितियां\n\
- स्वास्थ्य जानकारी\n\
- चिकित्सा उपचार\n\
- स्वास्थ्य सलाह",

    generic_error: "क्षमा करें, आपके अनुरोध को संसाधित करने में कुछ गलत हो गया। कृपया बाद में पुनः प्रयास करें।",
};
