//! Bundled sample corpora and questions for the demo scenarios

use crate::document::{Document, Meta};
use serde_json::Value;

/// Five short factual snippets, one per entity
pub const SAMPLE_TEXTS: [(&str, &str); 5] = [
    (
        "text1",
        "In 2023, the GDP of Country A grew by 3.5%, reaching a total of $1.5 trillion. This growth is attributed to increased consumer spending and a booming technology sector.",
    ),
    (
        "text2",
        "As of 2024, the population of City B is approximately 2.3 million, reflecting an increase of 4% from the previous year. The city has implemented new housing policies to accommodate the growing population.",
    ),
    (
        "text3",
        "In the 2022 season, Team C won 28 out of 50 games, achieving a win rate of 56%. They finished first in their division and qualified for the playoffs.",
    ),
    (
        "text4",
        "According to the latest environmental report, Company D reduced its carbon emissions by 20% over the past five years, bringing the total emissions down to 80,000 tons per year.",
    ),
    (
        "text5",
        "In 2023, School E had a graduation rate of 92%, with 300 out of 325 students successfully completing their programs. The school also reported an increase in student enrollment by 15%.",
    ),
];

pub const BASIC_QUERY: &str = "What was the graduation rate for School E in 2023?";
pub const BASIC_EXPECTED: &str = "92%";

/// A long multi-paragraph report that needs chunking before indexing
pub const TECH_REPORT: &str = "
In 2023, the global technology industry saw a remarkable transformation driven by advancements in artificial intelligence, 
machine learning, and the Internet of Things (IoT). According to the International Data Corporation (IDC), global spending 
on AI systems is projected to reach $500 billion, demonstrating a compound annual growth rate (CAGR) of 20% over the next 
five years. Companies across various sectors have begun to integrate AI into their operations, leading to increased efficiency 
and reduced costs.

In the automotive industry, electric vehicles (EVs) gained significant traction, with sales increasing by 35% compared to 
2022. Major automakers such as Tesla, Ford, and General Motors announced plans to expand their EV offerings. In addition, 
governments worldwide have implemented incentives to promote the adoption of electric vehicles, including tax credits and 
subsidies. The push for sustainable transportation solutions is also supported by advancements in battery technology, 
which have improved the range and affordability of EVs.

The healthcare sector has also experienced a significant transformation due to technology. Telehealth services surged in 
popularity, with a report from McKinsey & Company indicating that 40% of patients utilized telehealth options in 2023. 
This shift has made healthcare more accessible, particularly for individuals in rural areas. Furthermore, artificial 
intelligence has been instrumental in improving diagnostic accuracy, with AI algorithms capable of analyzing medical images 
and predicting patient outcomes with high precision.

In the finance sector, blockchain technology continued to gain momentum. The total market capitalization of cryptocurrencies 
surpassed $2 trillion, with Bitcoin and Ethereum remaining the most dominant currencies. Traditional financial institutions 
have begun to explore blockchain solutions for various applications, including cross-border payments, smart contracts, and 
asset tokenization. Regulatory bodies are also working to establish frameworks to ensure the security and legitimacy of 
cryptocurrency transactions.

Moreover, the retail industry underwent significant changes due to the increasing reliance on e-commerce. Online sales 
accounted for over 25% of total retail sales in 2023, according to the U.S. Department of Commerce. Retailers such as 
Amazon and Walmart expanded their online marketplaces, while smaller businesses also embraced e-commerce to reach a broader 
audience. Personalized shopping experiences powered by AI and machine learning algorithms have enhanced customer satisfaction 
and loyalty.

Sustainability emerged as a key focus for businesses across all sectors. Companies are increasingly adopting sustainable 
practices to reduce their carbon footprints and improve their environmental impact. According to a survey by Deloitte, 75% 
of consumers are willing to pay more for products from companies that demonstrate a commitment to sustainability. As a 
result, many organizations have set ambitious sustainability goals, including carbon neutrality by 2030 and zero waste to landfill.

In education, technology played a pivotal role in enhancing the learning experience. Online learning platforms gained popularity, 
providing access to quality education for students worldwide. The COVID-19 pandemic accelerated the adoption of remote learning, 
leading to innovations in digital classrooms and interactive learning materials. Educators have also begun to integrate gamification 
and adaptive learning technologies to engage students and personalize their educational journeys.

The entertainment industry has also seen a shift due to the rise of streaming services. Platforms like Netflix, Hulu, and Disney+ 
have gained millions of subscribers, leading to a decline in traditional cable television viewership. Original content production 
has skyrocketed, with streaming services investing heavily in creating exclusive shows and movies to attract and retain subscribers. 
This shift has also changed how audiences consume media, with binge-watching becoming a common behavior.

As we move forward into 2024, the convergence of these technological advancements will continue to shape various industries. 
Businesses that embrace innovation and prioritize sustainability will likely thrive in this rapidly changing landscape. The 
integration of technology in everyday life is expected to deepen, influencing how we work, learn, and interact with one another. 
Stakeholders across sectors must adapt to these changes and recognize the opportunities presented by emerging technologies.
";

pub const CHUNKED_QUERY: &str = "What is the projected global spending on AI systems in 2023?";
pub const CHUNKED_EXPECTED: &str = "$500 billion";

/// Reader model used by the chunked scenario, whose input window is 512 tokens
pub const CHUNKED_READER_MODEL: &str = "deepset/bert-base-uncased-squad2";

/// The snippets as documents, each tagged with its sample name
pub fn sample_documents() -> Vec<Document> {
    SAMPLE_TEXTS
        .iter()
        .map(|(name, text)| {
            let mut meta = Meta::new();
            meta.insert("name".to_string(), Value::from(*name));
            Document::with_meta(*text, meta)
        })
        .collect()
}

/// The report as a single unchunked document
pub fn tech_report_document() -> Document {
    Document::new(TECH_REPORT)
}
